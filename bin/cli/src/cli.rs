//! Command-line definition and argument parsing.

use clap::{Arg, ArgAction, ArgMatches, Command};
use school_manager_access::SignupRequest;
use std::path::PathBuf;

use crate::error::CliError;

/// A parsed subcommand.
#[derive(Debug, Clone)]
pub enum Action {
    Login { email: String, password: String },
    Signup(SignupRequest),
    Logout,
    ResetPassword { email: String },
    ChangePassword {
        password: String,
        confirm_password: Option<String>,
    },
    WhoAmI,
    Token,
    Open { path: String },
    Routes,
}

fn email_arg() -> Arg {
    Arg::new("email")
        .short('e')
        .long("email")
        .help("Account email address")
        .env("SCHOOL_MANAGER_EMAIL")
        .required(true)
}

fn password_arg() -> Arg {
    Arg::new("password")
        .short('p')
        .long("password")
        .help("Account password")
        .env("SCHOOL_MANAGER_PASSWORD")
        .hide_env_values(true)
        .required(true)
}

fn confirm_arg() -> Arg {
    Arg::new("confirm-password")
        .long("confirm-password")
        .help("Repeat the password")
}

/// Builds the command-line interface.
#[must_use]
pub fn command() -> Command {
    Command::new("school-manager")
        .about("Sign in to the school manager and check access to its views")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to a TOML configuration file")
                .env("SCHOOL_MANAGER_CONFIG")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log debug output to stderr")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("login")
                .about("Sign in with email and password")
                .arg(email_arg())
                .arg(password_arg()),
        )
        .subcommand(
            Command::new("signup")
                .about("Create an account")
                .arg(email_arg())
                .arg(password_arg())
                .arg(confirm_arg())
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .help("Display name"),
                ),
        )
        .subcommand(Command::new("logout").about("Sign out"))
        .subcommand(
            Command::new("reset-password")
                .about("Send a password reset email")
                .arg(email_arg()),
        )
        .subcommand(
            Command::new("change-password")
                .about("Change the signed-in user's password")
                .arg(password_arg().help("New password"))
                .arg(confirm_arg()),
        )
        .subcommand(Command::new("whoami").about("Show the current session and profile"))
        .subcommand(
            Command::new("token").about("Print a valid bearer token; exits 1 when signed out"),
        )
        .subcommand(
            Command::new("open")
                .about("Check whether the current session may open a view")
                .arg(Arg::new("path").help("View path, e.g. /teacher/grades").required(true)),
        )
        .subcommand(Command::new("routes").about("List protected views and their roles"))
}

fn required(matches: &ArgMatches, name: &str) -> Result<String, CliError> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| CliError::InvalidArgument {
            name: name.to_string(),
            reason: "missing value".to_string(),
        })
}

impl Action {
    /// Extracts the subcommand from parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if no known subcommand was given.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, CliError> {
        let Some((name, sub)) = matches.subcommand() else {
            return Err(CliError::InvalidArgument {
                name: "command".to_string(),
                reason: "no subcommand given".to_string(),
            });
        };
        Ok(match name {
            "login" => Self::Login {
                email: required(sub, "email")?,
                password: required(sub, "password")?,
            },
            "signup" => Self::Signup(SignupRequest {
                email: required(sub, "email")?,
                password: required(sub, "password")?,
                confirm_password: sub.get_one::<String>("confirm-password").cloned(),
                display_name: sub.get_one::<String>("name").cloned(),
            }),
            "logout" => Self::Logout,
            "reset-password" => Self::ResetPassword {
                email: required(sub, "email")?,
            },
            "change-password" => Self::ChangePassword {
                password: required(sub, "password")?,
                confirm_password: sub.get_one::<String>("confirm-password").cloned(),
            },
            "whoami" => Self::WhoAmI,
            "token" => Self::Token,
            "open" => Self::Open {
                path: required(sub, "path")?,
            },
            "routes" => Self::Routes,
            other => {
                return Err(CliError::InvalidArgument {
                    name: "command".to_string(),
                    reason: format!("unknown subcommand '{other}'"),
                });
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> (ArgMatches, Action) {
        let matches = command()
            .try_get_matches_from(args)
            .expect("valid arguments");
        let action = Action::from_matches(&matches).expect("action");
        (matches, action)
    }

    #[test]
    fn command_is_well_formed() {
        command().debug_assert();
    }

    #[test]
    fn login_takes_email_and_password() {
        let (_, action) = parse(&[
            "school-manager",
            "login",
            "--email",
            "t@school.test",
            "--password",
            "pw",
        ]);
        assert!(matches!(
            action,
            Action::Login { ref email, ref password } if email == "t@school.test" && password == "pw"
        ));
    }

    #[test]
    fn signup_collects_optional_fields() {
        let (_, action) = parse(&[
            "school-manager",
            "signup",
            "-e",
            "n@school.test",
            "-p",
            "abc123",
            "--confirm-password",
            "abc123",
            "--name",
            "Ada",
        ]);
        let Action::Signup(request) = action else {
            panic!("expected signup");
        };
        assert_eq!(request.confirm_password.as_deref(), Some("abc123"));
        assert_eq!(request.display_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let (matches, action) = parse(&[
            "school-manager",
            "open",
            "/admin",
            "--verbose",
            "--config",
            "/etc/school-manager.toml",
        ]);
        assert!(matches.get_flag("verbose"));
        assert_eq!(
            matches.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("/etc/school-manager.toml"))
        );
        assert!(matches!(action, Action::Open { ref path } if path == "/admin"));
    }

    #[test]
    fn open_requires_a_path() {
        assert!(
            command()
                .try_get_matches_from(["school-manager", "open"])
                .is_err()
        );
    }
}
