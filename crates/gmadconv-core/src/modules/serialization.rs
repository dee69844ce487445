use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Scientific notation with a signed two-digit exponent (`1.2346e-04`).
pub fn format_scientific_f64(value: f64, precision: usize) -> String {
    let rendered = format!("{value:.precision$e}", precision = precision);
    let Some((mantissa, exponent)) = rendered.split_once('e') else {
        return rendered;
    };
    match exponent.parse::<i32>() {
        Ok(exponent) => {
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        Err(_) => rendered,
    }
}

/// Shortest decimal that round-trips, without a trailing `.0` on integers.
pub fn format_shortest_f64(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let rendered = format!("{:?}", value);
    match rendered.strip_suffix(".0") {
        Some(integral) => integral.to_string(),
        None => rendered,
    }
}

pub fn normalize_text_artifact(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

pub fn write_text_artifact(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, normalize_text_artifact(content))
}

pub fn append_text_artifact(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.replace("\r\n", "\n").as_bytes())
}
