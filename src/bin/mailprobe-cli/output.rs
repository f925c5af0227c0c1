use anyhow::{Context, Result, bail};

use crate::args::Cli;
use mailprobe_lib::{ResultMap, VerificationResult};

/// Report rows in address order. Transcripts are dropped unless asked for.
pub fn rows(results: &ResultMap, keep_transcript: bool) -> Vec<VerificationResult> {
    results
        .values()
        .cloned()
        .map(|mut row| {
            if !keep_transcript {
                row.transcript.clear();
            }
            row
        })
        .collect()
}

pub fn write_reports(rows: &[VerificationResult], cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => write_human(rows, cli),
        "json" => write_json(rows, cli),
        "ndjson" => write_ndjson(rows, cli),
        "csv" => write_csv(rows, cli),
        other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
    }
}

pub fn any_invalid(rows: &[VerificationResult]) -> bool {
    rows.iter().any(|row| !row.is_valid)
}

fn write_human(rows: &[VerificationResult], cli: &Cli) -> Result<()> {
    let mut text = String::new();
    for row in rows {
        for line in human_lines(row) {
            text.push_str(&line);
            text.push('\n');
        }
    }
    match &cli.out {
        Some(path) => write_all_atomically(path, text.as_bytes()),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

fn human_lines(row: &VerificationResult) -> Vec<String> {
    let mut lines = Vec::new();
    let via = row
        .exchange
        .as_deref()
        .map(|mx| format!(" via {mx}"))
        .unwrap_or_default();
    if row.is_valid {
        lines.push(format!("[OK]      {}{via}", row.email));
    } else {
        let kind = row
            .error_kind
            .map(|kind| kind.as_str())
            .unwrap_or("unknown");
        let detail = row
            .raw_detail
            .as_deref()
            .map(|d| format!(": {}", d.trim_end().replace("\r\n", " | ").replace('\n', " | ")))
            .unwrap_or_default();
        lines.push(format!("[INVALID] {}{via} :: {kind}{detail}", row.email));
    }
    for entry in &row.transcript {
        lines.push(format!("          {entry}"));
    }
    lines
}

#[cfg(feature = "with-serde")]
fn write_json(rows: &[VerificationResult], cli: &Cli) -> Result<()> {
    let s = serde_json::to_string_pretty(rows)?;
    if let Some(path) = &cli.out {
        write_all_atomically(path, s.as_bytes())?;
    } else {
        println!("{s}");
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_json(_: &[VerificationResult], _: &Cli) -> Result<()> {
    bail!("format=json requires the 'with-serde' feature")
}

#[cfg(feature = "with-serde")]
fn write_ndjson(rows: &[VerificationResult], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut buf = Vec::new();
        for row in rows {
            let line = serde_json::to_string(row)?;
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        write_all_atomically(path, &buf)?;
    } else {
        for row in rows {
            println!("{}", serde_json::to_string(row)?);
        }
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_ndjson(_: &[VerificationResult], _: &Cli) -> Result<()> {
    bail!("format=ndjson requires the 'with-serde' feature")
}

#[cfg(feature = "with-csv")]
fn write_csv(rows: &[VerificationResult], cli: &Cli) -> Result<()> {
    const HEADER: [&str; 6] = ["email", "is_valid", "error_kind", "reply_code", "exchange", "detail"];
    if let Some(path) = &cli.out {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(HEADER)?;
        for row in rows {
            wtr.write_record(csv_record(row))?;
        }
        let data = wtr.into_inner()?;
        write_all_atomically(path, &data)?;
    } else {
        let mut wtr = csv::Writer::from_writer(std::io::stdout());
        wtr.write_record(HEADER)?;
        for row in rows {
            wtr.write_record(csv_record(row))?;
        }
        wtr.flush()?;
    }
    Ok(())
}

#[cfg(not(feature = "with-csv"))]
fn write_csv(_: &[VerificationResult], _: &Cli) -> Result<()> {
    bail!("format=csv requires the 'with-csv' feature")
}

#[cfg(feature = "with-csv")]
fn csv_record(row: &VerificationResult) -> Vec<String> {
    vec![
        row.email.clone(),
        row.is_valid.to_string(),
        row.error_kind
            .map(|kind| kind.as_str().to_string())
            .unwrap_or_default(),
        row.reply_code().map(|code| code.to_string()).unwrap_or_default(),
        row.exchange.clone().unwrap_or_default(),
        row.raw_detail
            .as_deref()
            .map(|d| d.trim_end().to_string())
            .unwrap_or_default(),
    ]
}

fn write_all_atomically(path: &str, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let tmp = format!("{path}.tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("rename {tmp} -> {path}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailprobe_lib::ErrorKind;

    #[test]
    fn human_line_for_valid_address() {
        let row = VerificationResult::valid("a@good.com").with_exchange("mx.good.com");
        insta::assert_snapshot!(human_lines(&row).join("\n"), @"[OK]      a@good.com via mx.good.com");
    }

    #[test]
    fn human_line_flattens_multiline_detail() {
        let row = VerificationResult::invalid(
            "ghost@good.com",
            ErrorKind::ProtocolReject,
            Some("550-no such user\r\n550 see docs\r\n".to_string()),
        );
        insta::assert_snapshot!(
            human_lines(&row).join("\n"),
            @"[INVALID] ghost@good.com :: protocol_reject: 550-no such user | 550 see docs"
        );
    }

    #[test]
    fn transcript_is_dropped_unless_requested() {
        let mut results = ResultMap::new();
        results.insert(
            "a@good.com".to_string(),
            VerificationResult::valid("a@good.com")
                .with_transcript(vec!["[mx.good.com] C: HELO sender.test".to_string()]),
        );
        assert!(rows(&results, false)[0].transcript.is_empty());
        let kept = rows(&results, true);
        assert_eq!(kept[0].transcript.len(), 1);
        assert_eq!(human_lines(&kept[0]).len(), 2);
        assert!(!any_invalid(&kept));
    }
}
