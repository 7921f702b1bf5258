use std::{
    io::{self, Write},
    process::ExitCode,
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use serde::Serialize;

use vision_pwmd::{
    cli::{DiagCli, SensorSelection},
    drivers::vision::{
        Identity, Vision,
        hiddev::HidDev,
        protocol::{InputReport, SENSOR_COUNT},
    },
};

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    device: &'a Identity,
    temperatures: Vec<Reading>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Reading {
    sensor: usize,
    celsius: f64,
}

fn readings(report: &InputReport<'_>, selection: SensorSelection) -> Vec<Reading> {
    let reading = |sensor: usize| Reading {
        sensor,
        celsius: report.temperature(sensor),
    };
    match selection {
        SensorSelection::All => (0..SENSOR_COUNT).map(reading).collect(),
        SensorSelection::Slot(sensor) => vec![reading(sensor)],
    }
}

fn render(
    out: &mut impl Write,
    identity: &Identity,
    report: &InputReport<'_>,
    args: &DiagCli,
) -> Result<()> {
    let selection = if args.verbose {
        SensorSelection::All
    } else {
        args.temp
    };
    let temperatures = readings(report, selection);

    if args.json {
        let snapshot = Snapshot {
            device: identity,
            temperatures,
        };
        serde_json::to_writer_pretty(&mut *out, &snapshot)?;
        writeln!(out)?;
        return Ok(());
    }

    if args.verbose {
        writeln!(out, "{identity}")?;
    }
    match selection {
        SensorSelection::All => {
            for Reading { sensor, celsius } in temperatures {
                writeln!(out, "Temp [{sensor}]: {celsius}")?;
            }
        }
        SensorSelection::Slot(_) => {
            for Reading { celsius, .. } in temperatures {
                writeln!(out, "{celsius}")?;
            }
        }
    }
    Ok(())
}

fn run(args: &DiagCli) -> Result<()> {
    let vision = Vision::<HidDev>::find()?
        .ok_or_else(|| anyhow!("Could not find a vision device."))?;
    let raw = vision
        .read_input_report()
        .context("Failed to read input report")?;
    let report = InputReport::parse(&raw)?;

    render(&mut io::stdout().lock(), vision.identity(), &report, args)?;

    if args.verbose {
        io::stderr().lock().write_all(&raw)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = DiagCli::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TEMPS: [u16; 5] = [2150, 2200, 0, 3000, 4500];

    fn report_bytes() -> Vec<u8> {
        let mut buf = vec![0u8; vision_pwmd::drivers::vision::protocol::REPORT_LEN];
        buf[0] = 1;
        for (slot, raw) in TEMPS.iter().enumerate() {
            let offset = vision_pwmd::drivers::vision::protocol::TEMPS_OFFSET + slot * 2;
            buf[offset..offset + 2].copy_from_slice(&raw.to_le_bytes());
        }
        buf
    }

    fn identity() -> Identity {
        Identity {
            vendor: "aquacomputer".into(),
            product: "VISION".into(),
        }
    }

    fn rendered(argv: &[&str]) -> String {
        let args = DiagCli::try_parse_from(argv).unwrap();
        let raw = report_bytes();
        let report = InputReport::parse(&raw).unwrap();
        let mut out = Vec::new();
        render(&mut out, &identity(), &report, &args).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn default_prints_every_sensor() {
        assert_eq!(
            rendered(&["visioncli"]),
            "Temp [0]: 21.5\nTemp [1]: 22\nTemp [2]: 0\nTemp [3]: 30\nTemp [4]: 45\n"
        );
    }

    #[test]
    fn single_sensor_prints_bare_value() {
        assert_eq!(rendered(&["visioncli", "-t", "0"]), "21.5\n");
    }

    #[test]
    fn verbose_adds_identity_and_ignores_selection() {
        let out = rendered(&["visioncli", "-v", "-t", "4"]);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "aquacomputer - VISION");
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[5], "Temp [4]: 45");
    }

    #[test]
    fn json_output() {
        let out = rendered(&["visioncli", "--json", "-t", "4"]);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["device"]["product"], "VISION");
        assert_eq!(value["temperatures"][0]["sensor"], 4);
        assert_eq!(value["temperatures"][0]["celsius"], 45.0);
    }
}
