//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Portal API client with a persistent login session
#[derive(Parser, Debug)]
#[command(name = "portal", version)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        env = "CONFIG_PATH",
        value_name = "FILE",
        default_value = "portal.toml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Log in with the configured account
    Login,
    /// Discard stored credentials
    Logout,
    /// Print the current session
    Whoami,
    /// Send requests on behalf of a tenant
    SelectTenant {
        /// Tenant id, as listed by `whoami`
        tenant_id: String,
    },
    /// Authenticated GET, prints the JSON response
    Get { url: String },
    /// Authenticated DELETE
    Delete { url: String },
    /// Authenticated POST with a JSON body
    Post {
        url: String,
        #[arg(value_parser = parse_json)]
        body: serde_json::Value,
    },
    /// Authenticated PUT with a JSON body
    Put {
        url: String,
        #[arg(value_parser = parse_json)]
        body: serde_json::Value,
    },
    /// Change the password of the logged-in account
    ChangePassword {
        /// New password
        #[arg(long, env = "PORTAL_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("body is not valid JSON: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("portal").chain(args.iter().copied()))
    }

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse(&["login"]).unwrap().command, Command::Login);
        assert_eq!(parse(&["logout"]).unwrap().command, Command::Logout);
        assert_eq!(parse(&["whoami"]).unwrap().command, Command::Whoami);
        assert_eq!(
            parse(&["select-tenant", "t-1"]).unwrap().command,
            Command::SelectTenant {
                tenant_id: "t-1".into()
            }
        );
    }

    #[test]
    fn config_flag_before_or_after_command() {
        let cli = parse(&["whoami", "--config", "/etc/portal.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/portal.toml"));
        assert_eq!(cli.command, Command::Whoami);

        let cli = parse(&["--config", "a.toml", "get", "/api/users"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("a.toml"));
        assert_eq!(
            cli.command,
            Command::Get {
                url: "/api/users".into()
            }
        );
    }

    #[test]
    fn config_flag_without_value_is_error() {
        assert!(parse(&["whoami", "--config"]).is_err());
    }

    #[test]
    fn operands_are_required() {
        assert!(parse(&["select-tenant"]).is_err());
        assert!(parse(&["get"]).is_err());
        assert!(parse(&["post", "/api/users"]).is_err());
    }

    #[test]
    fn post_and_put_parse_json_bodies() {
        let cli = parse(&["post", "/api/users", r#"{"name":"a"}"#]).unwrap();
        assert_eq!(
            cli.command,
            Command::Post {
                url: "/api/users".into(),
                body: serde_json::json!({"name": "a"})
            }
        );

        let cli = parse(&["put", "/api/users/1", "[1,2]"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Put {
                url: "/api/users/1".into(),
                body: serde_json::json!([1, 2])
            }
        );
    }

    #[test]
    fn invalid_json_body_is_error() {
        let err = parse(&["post", "/api/users", "{not-json"]).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"), "got: {err}");
    }

    #[test]
    fn change_password_takes_new_password_flag() {
        let cli = parse(&["change-password", "--new-password", "s3cret"]).unwrap();
        assert_eq!(
            cli.command,
            Command::ChangePassword {
                new_password: "s3cret".into()
            }
        );
    }

    #[test]
    fn unknown_or_missing_command() {
        assert!(parse(&["frobnicate"]).is_err());
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
