use clap::{Parser, Subcommand};
use image_workbench::{
    logger::{self, LoggerConfig},
    mask,
    prompt::enhance_prompt,
    CredentialStore, GeminiProvider, GenerationOutcome, ModelSettings, NodeData, ProjectDirectory,
    Provider, ProviderRegistry, Router, Workbench,
};
use std::error::Error;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "image-workbench", about = "Node-graph image generation workbench")]
enum Cli {
    /// Create an empty project directory
    New { dir: PathBuf },
    /// Add a PNG file as an image node
    Import { dir: PathBuf, png: PathBuf },
    /// Add a prompt node, optionally fed by existing nodes
    AddPrompt {
        dir: PathBuf,
        prompt: String,
        /// Source node ids to connect into the new node
        #[arg(long, num_args = 1..)]
        from: Vec<String>,
    },
    /// Run a generation for a prompt node
    Generate { dir: PathBuf, node: String },
    /// Paint a mask for an image or inpainting node from a strokes PNG
    Inpaint {
        dir: PathBuf,
        node: String,
        strokes: PathBuf,
    },
    /// Rewrite a prompt with Gemini
    Enhance { prompt: String },
    /// Manage stored API keys
    #[command(subcommand)]
    Keys(KeysCommand),
}

#[derive(Subcommand)]
enum KeysCommand {
    /// Store the key for one provider
    Set {
        #[arg(long)]
        provider: Provider,
        #[arg(long)]
        key: String,
    },
    /// Remove every stored key
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let env_loaded = dotenv::dotenv().is_ok();

    logger::init_with_config(LoggerConfig::from_env())?;

    if env_loaded {
        log::debug!("✅ .env file loaded");
    }

    let cli = Cli::parse();

    let store = CredentialStore::from_env();
    let workbench = Workbench::new(
        ModelSettings::from_env()?,
        Router::new(ProviderRegistry::with_defaults()?),
    )
    .with_credential_store(store.clone())?;
    logger::log_settings_info(&workbench.settings()?);

    match cli {
        Cli::New { dir } => {
            ProjectDirectory::new(&dir).reset()?;
            println!("Created project in {}", dir.display());
        }
        Cli::Import { dir, png } => {
            let project = open_project(&workbench, &dir)?;
            let id = workbench.import_image(&png)?;
            workbench.save_project(&project)?;
            println!("{}", id);
        }
        Cli::AddPrompt { dir, prompt, from } => {
            let project = open_project(&workbench, &dir)?;
            let id = workbench.create_generated_image_node(&prompt)?;
            for source in &from {
                workbench.connect(source, &id)?;
            }
            workbench.save_project(&project)?;
            println!("{}", id);
        }
        Cli::Generate { dir, node } => {
            let project = open_project(&workbench, &dir)?;
            let outcome = workbench.generate_image(&node).await?;
            workbench.save_project(&project)?;
            match outcome {
                GenerationOutcome::Success { cost_dollars, .. } => match cost_dollars {
                    Some(cost) => println!("Generated {} (${:.4})", node, cost),
                    None => println!("Generated {}", node),
                },
                GenerationOutcome::Error { message } => return Err(message.into()),
            }
        }
        Cli::Inpaint { dir, node, strokes } => {
            let project = open_project(&workbench, &dir)?;
            let target = match workbench.node(&node)?.data {
                NodeData::Inpainting(_) => node,
                _ => workbench.derive_inpainting(&node)?,
            };
            workbench.open_inpainter(&target)?;
            let strokes_b64 = mask::encode_base64(&std::fs::read(&strokes)?);
            workbench.save_mask_png(&strokes_b64)?;
            workbench.save_project(&project)?;
            println!("{}", target);
        }
        Cli::Enhance { prompt } => {
            let settings = workbench.settings()?;
            let enhanced = enhance_prompt(&GeminiProvider::new(), &prompt, &settings).await?;
            println!("{}", enhanced);
        }
        Cli::Keys(KeysCommand::Set { provider, key }) => {
            let mut keys = store.load()?;
            keys.set(provider, Some(key));
            workbench.set_api_keys(keys)?;
            println!("Saved {} key to {}", provider.display_name(), store.dir().display());
        }
        Cli::Keys(KeysCommand::Clear) => {
            workbench.clear_api_keys()?;
            println!("Cleared stored API keys");
        }
    }

    Ok(())
}

fn open_project(workbench: &Workbench, dir: &Path) -> image_workbench::Result<ProjectDirectory> {
    let project = ProjectDirectory::new(dir);
    workbench.load_project(&project)?;
    Ok(project)
}
