//! Report file writing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use fleetq_core::{ExportFormat, ResultData};

/// How report files are named inside the output directory.
#[derive(Debug, Clone, Default)]
pub struct ReportNaming {
    /// Text placed before the generated stem.
    pub prefix: String,
    /// Text placed between the generated stem and the extension.
    pub postfix: String,
}

impl ReportNaming {
    /// Build `<prefix><stem>_<timestamp><postfix>.<extension>`.
    #[must_use]
    pub fn file_name(&self, stem: &str, extension: &str, at: DateTime<Utc>) -> String {
        format!(
            "{}{}_{}{}.{}",
            self.prefix,
            sanitize(stem),
            at.format("%Y_%m_%d-%H_%M_%S"),
            self.postfix,
            extension
        )
    }
}

/// File extension matching the shape of `data`.
#[must_use]
pub const fn extension_for(data: &ResultData) -> &'static str {
    match data {
        ResultData::Set(_) => "json",
        ResultData::Encoded { format, .. } => match format {
            ExportFormat::Csv => "csv",
            ExportFormat::Xml | ExportFormat::XmlObject => "xml",
            ExportFormat::Cef => "cef",
        },
    }
}

/// Write `contents` into `dir`, creating the directory on demand.
///
/// Returns the path written.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot
/// be written.
pub fn write_report(
    dir: &Path,
    naming: &ReportNaming,
    stem: &str,
    extension: &str,
    contents: &str,
) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create report directory {}", dir.display()))?;
    let path = dir.join(naming.file_name(stem, extension, Utc::now()));
    fs::write(&path, contents)
        .with_context(|| format!("failed to write report {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = contents.len(), "Report written");
    Ok(path)
}

fn sanitize(stem: &str) -> String {
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fleetq_core::ResultSet;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn file_name_applies_prefix_and_postfix() {
        let naming = ReportNaming {
            prefix: "nightly_".to_string(),
            postfix: "_eu".to_string(),
        };
        assert_eq!(
            naming.file_name("question 42", "csv", fixed_time()),
            "nightly_question_42_2024_03_09-14_05_07_eu.csv"
        );
    }

    #[test]
    fn file_name_without_decoration() {
        let naming = ReportNaming::default();
        assert_eq!(
            naming.file_name("saved_questions", "json", fixed_time()),
            "saved_questions_2024_03_09-14_05_07.json"
        );
    }

    #[test]
    fn extension_follows_data_shape() {
        assert_eq!(extension_for(&ResultData::Set(ResultSet::default())), "json");
        let cef = ResultData::Encoded {
            format: ExportFormat::Cef,
            text: String::new(),
        };
        assert_eq!(extension_for(&cef), "cef");
    }

    #[test]
    fn write_report_creates_missing_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("reports").join("daily");

        let path = write_report(&dir, &ReportNaming::default(), "question_7", "csv", "a,b\n")
            .unwrap();

        assert!(path.starts_with(&dir));
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n");
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));
    }
}
