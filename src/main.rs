use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use robostore::{
    AppConfig, ClientResult, Store,
    cli::{
        ArtifactCommand, AuthCommand, Cli, Command, KRecCommand, RobotClassCommand, RobotCommand,
        UserCommand,
    },
    errors::verbose_pointer,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --- Parse config ---
    let cli = Cli::parse();
    let cfg = AppConfig::from_env_and_args(&cli.global)?;
    let verbose = cfg.verbose_errors;
    tracing::debug!(api_root = %cfg.api_root, config_dir = %cfg.config_dir.display(), "configured");

    let store = Store::new(cfg);
    match run(cli.command, &store).await {
        Ok(()) => Ok(()),
        Err(err) if verbose => Err(anyhow::Error::new(err).context("command failed")),
        Err(err) => {
            tracing::error!(category = ?err.category(), "{err}");
            tracing::info!("{}", verbose_pointer());
            std::process::exit(1);
        }
    }
}

async fn run(command: Command, store: &Store) -> ClientResult<()> {
    match command {
        Command::Auth(AuthCommand::Token) => {
            let token = store.bearer_token().await?;
            println!("{}", token.as_str());
        }
        Command::User(UserCommand::Me) => print_json(&store.users().profile().await?)?,

        Command::Urdf(cmd) => {
            let urdfs = store.urdfs();
            match cmd {
                ArtifactCommand::Download { artifact_id, refresh } => {
                    let dir = urdfs.download(&artifact_id, !refresh).await?;
                    println!("{}", dir.display());
                }
                ArtifactCommand::Info { artifact_id } => print_json(&urdfs.info(&artifact_id).await?)?,
                ArtifactCommand::RemoveLocal { artifact_id } => urdfs.remove_local(&artifact_id).await?,
                ArtifactCommand::Upload { listing_id, path } => {
                    let uploaded = urdfs.upload(&listing_id, &path).await?;
                    println!("{}", uploaded.artifact_id);
                }
            }
        }

        Command::Kernel(cmd) => {
            let kernels = store.kernels();
            match cmd {
                ArtifactCommand::Download { artifact_id, refresh } => {
                    let path = kernels.download(&artifact_id, !refresh).await?;
                    println!("{}", path.display());
                }
                ArtifactCommand::Info { artifact_id } => print_json(&kernels.info(&artifact_id).await?)?,
                ArtifactCommand::RemoveLocal { artifact_id } => kernels.remove_local(&artifact_id).await?,
                ArtifactCommand::Upload { listing_id, path } => {
                    let uploaded = kernels.upload(&listing_id, &path).await?;
                    println!("{}", uploaded.artifact_id);
                }
            }
        }

        Command::Krec(cmd) => {
            let krecs = store.krecs();
            match cmd {
                KRecCommand::Download { krec_id } => {
                    let path = krecs.download(&krec_id).await?;
                    println!("{}", path.display());
                }
                KRecCommand::Info { krec_id } => print_json(&krecs.info(&krec_id).await?)?,
                KRecCommand::RemoveLocal { krec_id } => krecs.remove_local(&krec_id).await?,
                KRecCommand::Upload {
                    robot_id,
                    path,
                    description,
                } => {
                    let receipt = krecs.upload(&robot_id, &path, description.as_deref()).await?;
                    println!("{}", receipt.resource_id);
                }
            }
        }

        Command::RobotClass(cmd) => {
            let classes = store.robot_classes();
            match cmd {
                RobotClassCommand::List => print_json(&classes.api().list().await?)?,
                RobotClassCommand::Add { name, description } => {
                    print_json(&classes.api().create(&name, description.as_deref()).await?)?
                }
                RobotClassCommand::Update(args) => {
                    let updated = classes
                        .api()
                        .update(&args.name, args.new_name.as_deref(), args.description.as_deref())
                        .await?;
                    print_json(&updated)?
                }
                RobotClassCommand::Delete { name } => {
                    classes.api().delete(&name).await?;
                    tracing::info!(class_name = %name, "deleted robot class");
                }
                RobotClassCommand::UrdfUpload { name, archive } => classes.upload_urdf(&name, &archive).await?,
                RobotClassCommand::UrdfDownload { name, refresh } => {
                    let path = classes.download_urdf(&name, !refresh).await?;
                    println!("{}", path.display());
                }
            }
        }

        Command::Robot(cmd) => {
            let robots = store.robots();
            match cmd {
                RobotCommand::List { user: Some(user) } => print_json(&robots.list_for_user(&user).await?)?,
                RobotCommand::List { user: None } => print_json(&robots.list().await?)?,
                RobotCommand::Add {
                    name,
                    class_name,
                    description,
                } => print_json(&robots.add(&name, &class_name, description.as_deref()).await?)?,
                RobotCommand::Get { name_or_id, id: true } => print_json(&robots.by_id(&name_or_id).await?)?,
                RobotCommand::Get { name_or_id, id: false } => print_json(&robots.by_name(&name_or_id).await?)?,
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> ClientResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
