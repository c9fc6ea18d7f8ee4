use clap::Parser;

/// Prunes untagged and stale artifacts from a ghcr.io container package.
#[derive(Debug, Parser)]
#[command(name = "ghcr-prune", version, about = "Prune ghcr.io container package artifacts")]
pub struct Cli {
    /// Enable verbose logging (debug level), overriding `INPUT_LOG_LEVEL`.
    #[arg(short, long)]
    pub verbose: bool,

    /// Compute and log the plan without deleting anything, overriding `INPUT_DRY_RUN`.
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    #[test]
    fn parses_verbose_flag() {
        let cli = Cli::try_parse_from(["ghcr-prune", "--verbose"]).expect("parse");
        assert!(cli.verbose);
    }

    #[test]
    fn parses_dry_run_flag() {
        let cli = Cli::try_parse_from(["ghcr-prune", "--dry-run"]).expect("parse");
        assert!(cli.dry_run);
    }

    #[test]
    fn defaults_are_false() {
        let cli = Cli::try_parse_from(["ghcr-prune"]).expect("parse");
        assert!(!cli.verbose);
        assert!(!cli.dry_run);
    }
}
