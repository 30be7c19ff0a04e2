//! Console commands
//!
//! Each command runs against a [`Console`] and returns the text to print.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::Subcommand;
use tracing::info;

use garden_sync::{
    AssociationSession, AssociationSyncClient, AvailabilityStore, BlobRegistry, Credential,
    EndpointResolver, FetchOutcome, GardenApiClient, NetworkContext, Protocol, ResourceLoader,
    ResourceStatus, SecondarySync, SectorId, SectorUpdate, SpeciesId, SyncError,
};

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show which API base URL a console location resolves to
    Endpoint {
        /// Hostname the console is served from
        #[arg(long)]
        host: Option<String>,
        /// Protocol the console is served over (http, https)
        #[arg(long, default_value = "https")]
        protocol: String,
    },

    /// Species catalogue
    #[command(subcommand)]
    Species(SpeciesCommands),

    /// Garden sectors
    #[command(subcommand)]
    Sectors(SectorCommands),

    /// Protected photos
    #[command(subcommand)]
    Photo(PhotoCommands),
}

#[derive(Debug, Subcommand)]
pub enum SpeciesCommands {
    /// List species
    List,
}

#[derive(Debug, Subcommand)]
pub enum SectorCommands {
    /// List sectors
    List,

    /// Show the species assigned to a sector
    Members {
        /// Sector id
        id: i64,
    },

    /// Save a sector and assign species to it
    Assign {
        /// Sector id
        id: i64,
        /// Species ids, comma separated
        #[arg(long, value_delimiter = ',')]
        species: Vec<i64>,
        /// New sector name (defaults to the current one)
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum PhotoCommands {
    /// Download a photo through the authenticated loader
    Fetch {
        /// Photo URL or API path
        locator: String,
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
    },
}

/// Everything a command needs
pub struct Console {
    pub resolver: EndpointResolver,
    pub api: Arc<GardenApiClient>,
    pub gates: Arc<AvailabilityStore>,
    pub registry: BlobRegistry,
}

impl Console {
    fn sync_client(&self) -> AssociationSyncClient {
        AssociationSyncClient::new(self.api.clone(), self.gates.clone())
    }
}

/// Run one command and render its output.
pub async fn execute_command(console: &Console, command: Commands) -> anyhow::Result<String> {
    match command {
        Commands::Endpoint { host, protocol } => {
            let protocol = Protocol::parse(&protocol)
                .ok_or_else(|| anyhow!("unknown protocol '{}'", protocol))?;
            let context = match host {
                Some(host) => NetworkContext::new(host, protocol),
                None => NetworkContext::detached(),
            };
            let (base_url, rule) = console.resolver.resolve_with_rule(&context)?;
            Ok(format!("{} ({:?})", base_url, rule))
        }

        Commands::Species(SpeciesCommands::List) => {
            let species = console.api.list_species().await?;
            let lines: Vec<String> = species
                .iter()
                .map(|s| match &s.scientific_name {
                    Some(scientific) => format!("{:>5}  {} ({})", s.id, s.common_name, scientific),
                    None => format!("{:>5}  {}", s.id, s.common_name),
                })
                .collect();
            Ok(lines.join("\n"))
        }

        Commands::Sectors(SectorCommands::List) => {
            let sectors = console.api.list_sectors().await?;
            let lines: Vec<String> = sectors
                .iter()
                .map(|s| format!("{:>5}  {}", s.id, s.name))
                .collect();
            Ok(lines.join("\n"))
        }

        Commands::Sectors(SectorCommands::Members { id }) => {
            let session = AssociationSession::new();
            let outcome = console
                .sync_client()
                .fetch_associations(&session, SectorId(id))
                .await?;
            if let FetchOutcome::Failed(reason) = &outcome {
                bail!("could not read species for sector {}: {}", id, reason);
            }
            let set = session
                .current()
                .ok_or_else(|| anyhow!("no association state for sector {}", id))?;
            Ok(format!(
                "sector {}: [{}] ({:?})",
                id,
                join_ids(&set.member_ids),
                set.sync_status
            ))
        }

        Commands::Sectors(SectorCommands::Assign { id, species, name }) => {
            let owner = SectorId(id);
            let sectors = console.api.list_sectors().await?;
            let sector = sectors
                .into_iter()
                .find(|s| s.id == owner)
                .ok_or_else(|| anyhow!("sector {} not found", id))?;
            let update = SectorUpdate {
                nombre: name.unwrap_or(sector.name),
                descripcion: sector.description,
                ubicacion: sector.location,
            };
            let members: BTreeSet<SpeciesId> = species.into_iter().map(SpeciesId).collect();

            let session = AssociationSession::new();
            let report = console
                .sync_client()
                .save_sector(&session, owner, &update, members.clone())
                .await?;
            info!(sector = %owner, degraded = report.is_degraded(), "Sector saved");

            Ok(match report.associations {
                SecondarySync::Synced => {
                    format!("sector {} saved with species [{}]", id, join_ids(&members))
                }
                SecondarySync::LocalOnly { notice } => notice,
            })
        }

        Commands::Photo(PhotoCommands::Fetch { locator, out }) => {
            let loader = ResourceLoader::new(
                console.api.transport(),
                console.registry.clone(),
                console.api.base_url().clone(),
                console.api.config(),
            );
            let credential: Option<Credential> = console.api.credential();
            let view = loader
                .load(&locator, credential.as_ref())
                .await
                .ok_or_else(|| anyhow!("load of {} was superseded", locator))?;

            if view.status != ResourceStatus::Ready {
                let reason = view
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string());
                bail!("could not load {}: {}", locator, reason);
            }

            let src = view.src.unwrap_or_default();
            let blob = match console.registry.get(&src) {
                Some(blob) => blob,
                None => return Ok(format!("{} is public: {}", locator, src)),
            };
            std::fs::write(&out, blob.bytes.as_slice())
                .with_context(|| format!("writing {}", out.display()))?;
            loader.teardown();
            Ok(format!("wrote {} bytes to {}", blob.bytes.len(), out.display()))
        }
    }
}

/// Message shown when a command fails.
pub fn describe_error(error: &anyhow::Error) -> String {
    match error.downcast_ref::<SyncError>() {
        Some(e) if e.status() == Some(401) => {
            format!("{}. Log in again or pass a fresh --token.", e)
        }
        Some(e) if e.is_recoverable() => {
            format!("Could not reach the garden API ({}). Nothing was changed; try again.", e)
        }
        _ => format!("{:#}", error),
    }
}

fn join_ids(ids: &BTreeSet<SpeciesId>) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}
