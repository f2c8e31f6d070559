//! Tests for CLI command parsing

#[cfg(test)]
mod tests {
    use clap::Parser;
    use std::path::PathBuf;

    use crate::{Cli, Commands};

    #[test]
    fn test_cli_parsing_no_args() {
        let cli = Cli::try_parse_from(["dbrefresh"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
        assert!(cli.config.is_none());

        // no subcommand means a full refresh
        match cli.command.unwrap_or_default() {
            Commands::Refresh { no_reset, json } => {
                assert!(!no_reset);
                assert!(!json);
            }
            _ => panic!("Expected Refresh command"),
        }
    }

    #[test]
    fn test_cli_parsing_global_flags() {
        let cli =
            Cli::try_parse_from(["dbrefresh", "--verbose", "--config", "/etc/dbrefresh.toml"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/dbrefresh.toml")));

        // global flags are accepted after the subcommand too
        let cli = Cli::try_parse_from(["dbrefresh", "snapshot", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Commands::Snapshot)));
    }

    #[test]
    fn test_cli_parsing_refresh_command() {
        let cli = Cli::try_parse_from(["dbrefresh", "refresh", "--no-reset", "--json"]).unwrap();
        match cli.command {
            Some(Commands::Refresh { no_reset, json }) => {
                assert!(no_reset);
                assert!(json);
            }
            _ => panic!("Expected Refresh command"),
        }
    }

    #[test]
    fn test_cli_parsing_apply_command() {
        let cli =
            Cli::try_parse_from(["dbrefresh", "apply", "b.sql", "a.sql"]).unwrap();
        match cli.command {
            Some(Commands::Apply { files }) => {
                assert_eq!(files, vec![PathBuf::from("b.sql"), PathBuf::from("a.sql")]);
            }
            _ => panic!("Expected Apply command"),
        }

        let cli = Cli::try_parse_from(["dbrefresh", "apply"]).unwrap();
        match cli.command {
            Some(Commands::Apply { files }) => assert!(files.is_empty()),
            _ => panic!("Expected Apply command"),
        }
    }

    #[test]
    fn test_command_names() {
        assert_eq!(Commands::default().name(), "refresh");
        assert_eq!(Commands::Snapshot.name(), "snapshot");
        assert_eq!(Commands::Apply { files: Vec::new() }.name(), "apply");
    }

    #[test]
    fn test_cli_parsing_invalid_input() {
        assert!(Cli::try_parse_from(["dbrefresh", "deploy"]).is_err());
        assert!(Cli::try_parse_from(["dbrefresh", "snapshot", "--json"]).is_err());
        assert!(Cli::try_parse_from(["dbrefresh", "--config"]).is_err());
    }
}
