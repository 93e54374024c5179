use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

/// Flags of the `probe_report` tool.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportOptions {
    pub level: Option<PathBuf>,
    pub baked: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub frames: Option<u32>,
    pub step: Option<f64>,
    pub show_help: bool,
}

impl ReportOptions {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = ReportOptions::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if flag == "--help" || flag == "-h" {
                options.show_help = true;
                continue;
            }
            if !flag.starts_with("--") {
                bail!("Unexpected argument '{flag}'. Use --level/--baked/--config/--frames/--step with values.");
            }
            let key = &flag[2..];
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "level" => options.level = Some(PathBuf::from(value)),
                "baked" => options.baked = Some(PathBuf::from(value)),
                "config" => options.config = Some(PathBuf::from(value)),
                "frames" => {
                    options.frames =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid frame count '{value}'"))?);
                }
                "step" => {
                    let step = value.parse::<f64>().with_context(|| format!("Invalid step '{value}'"))?;
                    if !step.is_finite() || step <= 0.0 {
                        bail!("Invalid step '{value}'. Use a positive number of seconds.");
                    }
                    options.step = Some(step);
                }
                _ => bail!("Unknown flag '{flag}'. Supported flags: --level, --baked, --config, --frames, --step."),
            }
        }
        Ok(options)
    }

    pub fn frames_or_default(&self) -> u32 {
        self.frames.unwrap_or(120)
    }

    pub fn step_or_default(&self) -> f64 {
        self.step.unwrap_or(1.0 / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paths_and_counts() {
        let args = ["probe_report", "--level", "maps/a.json", "--baked", "maps/a.light.json", "--frames", "30"];
        let options = ReportOptions::parse(args).expect("parse options");
        assert_eq!(options.level, Some(PathBuf::from("maps/a.json")));
        assert_eq!(options.baked, Some(PathBuf::from("maps/a.light.json")));
        assert_eq!(options.frames_or_default(), 30);
        assert!(options.config.is_none());
    }

    #[test]
    fn latest_flag_wins() {
        let args = ["probe_report", "--frames", "10", "--frames", "90", "--step", "0.5"];
        let options = ReportOptions::parse(args).expect("parse options");
        assert_eq!(options.frames, Some(90));
        assert_eq!(options.step_or_default(), 0.5);
    }

    #[test]
    fn missing_value_errors() {
        let err = ReportOptions::parse(["probe_report", "--level"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"), "error should mention missing value");
    }

    #[test]
    fn rejects_unknown_flags_and_bad_steps() {
        let err = ReportOptions::parse(["probe_report", "--foo", "bar"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"), "unknown flags should error");
        let err = ReportOptions::parse(["probe_report", "--step", "-1"]).unwrap_err();
        assert!(err.to_string().contains("Invalid step"));
    }
}
