//! Command-line surface: `robostore [global flags] <group> <command>`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::GlobalArgs;

#[derive(Parser, Debug)]
#[command(name = "robostore", author, version, about = "Robot asset store client", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Credentials
    #[command(subcommand)]
    Auth(AuthCommand),
    /// The logged-in user
    #[command(subcommand)]
    User(UserCommand),
    /// URDF artifacts attached to listings
    #[command(subcommand)]
    Urdf(ArtifactCommand),
    /// Kernel images attached to listings
    #[command(subcommand)]
    Kernel(ArtifactCommand),
    /// Recorded robot telemetry
    #[command(subcommand)]
    Krec(KRecCommand),
    /// Robot classes and their URDF archives
    #[command(subcommand)]
    RobotClass(RobotClassCommand),
    /// Individual robots
    #[command(subcommand)]
    Robot(RobotCommand),
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Print a valid bearer token, logging in if needed
    Token,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Show the authenticated user's profile
    Me,
}

/// Commands shared by the listing artifact kinds.
#[derive(Subcommand, Debug)]
pub enum ArtifactCommand {
    /// Download an artifact into the local cache
    Download {
        artifact_id: String,
        /// Rebuild any extracted copy and re-verify the cached archive
        #[arg(long)]
        refresh: bool,
    },
    /// Show an artifact's metadata
    Info { artifact_id: String },
    /// Remove an artifact's local cache (`all` removes every cache)
    RemoveLocal { artifact_id: String },
    /// Upload to a listing (a directory for URDFs, an .img file for kernels)
    Upload { listing_id: String, path: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum KRecCommand {
    /// Download a K-Rec into the local cache
    Download { krec_id: String },
    /// Show a K-Rec's download metadata
    Info { krec_id: String },
    /// Remove a K-Rec's local cache (`all` removes every cache)
    RemoveLocal { krec_id: String },
    /// Upload a K-Rec file for a robot
    Upload {
        robot_id: String,
        path: PathBuf,
        /// Description of the K-Rec
        #[arg(long, short)]
        description: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum RobotClassCommand {
    /// List all robot classes
    List,
    /// Create a robot class
    Add {
        name: String,
        #[arg(long, short)]
        description: Option<String>,
    },
    /// Rename or re-describe a robot class
    Update(UpdateClassArgs),
    /// Delete a robot class
    Delete { name: String },
    /// Upload a .tgz URDF archive for a class
    UrdfUpload { name: String, archive: PathBuf },
    /// Download a class's URDF archive
    UrdfDownload {
        name: String,
        /// Ask the server even if the cached archive is fresh
        #[arg(long)]
        refresh: bool,
    },
}

#[derive(Args, Debug)]
pub struct UpdateClassArgs {
    pub name: String,
    #[arg(long)]
    pub new_name: Option<String>,
    #[arg(long, short)]
    pub description: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum RobotCommand {
    /// List robots, optionally only those of one user (`me` for yourself)
    List {
        #[arg(long)]
        user: Option<String>,
    },
    /// Register a robot of an existing class
    Add {
        name: String,
        class_name: String,
        #[arg(long, short)]
        description: Option<String>,
    },
    /// Look up a robot by name, or by id with `--id`
    Get {
        name_or_id: String,
        #[arg(long)]
        id: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "robostore",
            "urdf",
            "download",
            "abc123",
            "--refresh",
            "--config-dir",
            "/tmp/rs",
        ])
        .unwrap();
        assert_eq!(cli.global.config_dir, Some(PathBuf::from("/tmp/rs")));
        assert!(!cli.global.no_cache);
        match cli.command {
            Command::Urdf(ArtifactCommand::Download { artifact_id, refresh }) => {
                assert_eq!(artifact_id, "abc123");
                assert!(refresh);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn kebab_case_command_names() {
        let cli = Cli::try_parse_from(["robostore", "robot-class", "urdf-download", "arm"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::RobotClass(RobotClassCommand::UrdfDownload { refresh: false, .. })
        ));
        let cli = Cli::try_parse_from(["robostore", "kernel", "remove-local", "all"]).unwrap();
        assert!(matches!(cli.command, Command::Kernel(ArtifactCommand::RemoveLocal { .. })));
    }
}
