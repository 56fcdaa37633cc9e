use clap::Parser;
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "roi-planner")]
#[command(about = "Selects projects that maximize final capital")]
pub struct CliArgs {
    #[arg(long, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "CSV file with name,required_capital,profit rows")]
    pub projects: PathBuf,

    #[arg(long, default_value = "1")]
    pub max_selections: i64,

    #[arg(long, default_value = "0")]
    pub initial_capital: Decimal,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments() {
        let args = CliArgs::parse_from([
            "roi-planner",
            "--projects",
            "projects.csv",
            "--max-selections",
            "3",
            "--initial-capital",
            "12.50",
            "--verbose",
        ]);

        assert_eq!(args.projects, PathBuf::from("projects.csv"));
        assert_eq!(args.max_selections, 3);
        assert_eq!(args.initial_capital, Decimal::new(1250, 2));
        assert!(args.verbose);
        assert!(!args.json_logs);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_projects_required() {
        assert!(CliArgs::try_parse_from(["roi-planner"]).is_err());
    }
}
