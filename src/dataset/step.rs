//! Target file functions: which segment a reference time lands in.

use crate::error::{ArkiError, Result};
use crate::types::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Yearly,
    Monthly,
    Biweekly,
    Weekly,
    Daily,
    Singlefile,
}

impl Step {
    pub fn parse(s: &str) -> Result<Step> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yearly" => Ok(Step::Yearly),
            "monthly" => Ok(Step::Monthly),
            "biweekly" => Ok(Step::Biweekly),
            "weekly" => Ok(Step::Weekly),
            "daily" => Ok(Step::Daily),
            "singlefile" => Ok(Step::Singlefile),
            other => Err(ArkiError::parse(
                "dataset step",
                format!("unknown step `{other}`"),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::Yearly => "yearly",
            Step::Monthly => "monthly",
            Step::Biweekly => "biweekly",
            Step::Weekly => "weekly",
            Step::Daily => "daily",
            Step::Singlefile => "singlefile",
        }
    }

    /// Relative path of the segment holding data at `t`.
    pub fn target_file(&self, t: &Time, format: &str) -> String {
        match self {
            Step::Yearly => format!("{:02}/{:04}.{format}", t.ye / 100, t.ye),
            Step::Monthly => format!("{:04}/{:02}.{format}", t.ye, t.mo),
            Step::Biweekly => {
                let half = if t.da <= 15 { 1 } else { 2 };
                format!("{:04}/{:02}-{half}.{format}", t.ye, t.mo)
            }
            Step::Weekly => {
                let week = (t.da - 1) / 7 + 1;
                format!("{:04}/{:02}-{week}.{format}", t.ye, t.mo)
            }
            Step::Daily => format!("{:04}/{:02}-{:02}.{format}", t.ye, t.mo, t.da),
            Step::Singlefile => format!("all.{format}"),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_files() {
        let t = Time::new(2007, 6, 5, 4, 3, 2);
        assert_eq!(Step::Yearly.target_file(&t, "grib"), "20/2007.grib");
        assert_eq!(Step::Monthly.target_file(&t, "grib"), "2007/06.grib");
        assert_eq!(Step::Biweekly.target_file(&t, "grib"), "2007/06-1.grib");
        assert_eq!(Step::Weekly.target_file(&t, "grib"), "2007/06-1.grib");
        assert_eq!(Step::Daily.target_file(&t, "grib"), "2007/06-05.grib");
        assert_eq!(Step::Singlefile.target_file(&t, "grib"), "all.grib");

        let late = Time::new(2007, 6, 25, 0, 0, 0);
        assert_eq!(Step::Biweekly.target_file(&late, "grib"), "2007/06-2.grib");
        assert_eq!(Step::Weekly.target_file(&late, "grib"), "2007/06-4.grib");
    }

    #[test]
    fn test_parse() {
        assert_eq!(Step::parse("daily").unwrap(), Step::Daily);
        assert_eq!(Step::parse("Monthly").unwrap(), Step::Monthly);
        assert!(Step::parse("fortnightly").is_err());
    }
}
