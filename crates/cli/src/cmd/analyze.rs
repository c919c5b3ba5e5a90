use anyhow::{Context, Result};
use argp::FromArgs;
use ci_triage_core::{
    Extractor, analyze_run,
    config::AnalysisConfig,
    models::Outcome,
    reconcile::render_comment,
};
use ci_triage_github::parse_jobs;
use serde::Deserialize;
use typed_path::Utf8NativePathBuf;

fn native_path(value: &str) -> Result<Utf8NativePathBuf, String> {
    Ok(Utf8NativePathBuf::from(value))
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Analyze a downloaded log archive and print the comment the bot would post.
#[argp(subcommand, name = "analyze")]
pub struct Args {
    #[argp(option, short = 'l', from_str_fn(native_path))]
    /// log archive (zip) of the workflow run
    logs: Utf8NativePathBuf,
    #[argp(option, short = 'j', from_str_fn(native_path))]
    /// jobs list of the workflow run, as returned by the GitHub API
    jobs: Utf8NativePathBuf,
    #[argp(option, short = 'c', from_str_fn(native_path))]
    /// bot config file to read analysis settings from
    config: Option<Utf8NativePathBuf>,
    #[argp(option, short = 'o', from_str_fn(native_path))]
    /// write the comment to output file
    output: Option<Utf8NativePathBuf>,
}

/// Only the analysis section of a bot config file.
#[derive(Deserialize, Default)]
struct AnalysisOnly {
    #[serde(default)]
    analysis: AnalysisConfig,
}

fn load_analysis_config(path: Option<&Utf8NativePathBuf>) -> Result<AnalysisConfig> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let data = std::fs::read(path.with_platform_encoding())
        .with_context(|| format!("Failed to read {}", path))?;
    let config: AnalysisOnly =
        serde_yaml::from_slice(&data).with_context(|| format!("Failed to parse {}", path))?;
    Ok(config.analysis)
}

pub fn run(args: Args) -> Result<()> {
    let analysis = load_analysis_config(args.config.as_ref())?;
    let extractor = Extractor::new(&analysis).context("Invalid analysis config")?;
    let jobs_data = std::fs::read(args.jobs.with_platform_encoding())
        .with_context(|| format!("Failed to read {}", args.jobs))?;
    let jobs = parse_jobs(&jobs_data).with_context(|| format!("Failed to parse {}", args.jobs))?;
    let archive = std::fs::read(args.logs.with_platform_encoding())
        .with_context(|| format!("Failed to read {}", args.logs))?;
    let outcome = analyze_run(&jobs, &archive, &extractor)
        .with_context(|| format!("Failed to analyze {}", args.logs))?;
    tracing::info!("{} jobs, outcome: {}", jobs.len(), outcome);

    let Outcome::FailedWithEvidence(report) = &outcome else {
        println!("{}", outcome);
        return Ok(());
    };
    let comment = render_comment(report);
    if let Some(out_path) = &args.output {
        std::fs::write(out_path.with_platform_encoding(), comment)
            .with_context(|| format!("Failed to write output file '{}'", out_path))?;
    } else {
        println!("{}", comment);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_section_only() {
        let config: AnalysisOnly = serde_yaml::from_str(
            "server: { port: 10000 }\nanalysis:\n  markers: [boom]\n  case_insensitive: true\n",
        )
        .unwrap();
        assert_eq!(config.analysis.markers, vec!["boom"]);
        assert!(config.analysis.case_insensitive);
        assert!(!config.analysis.noise.is_empty());
    }

    #[test]
    fn test_default_analysis_config() {
        let analysis = load_analysis_config(None).unwrap();
        assert!(analysis.markers.iter().any(|m| m == "FAILED"));
    }
}
