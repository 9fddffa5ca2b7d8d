//! Operator CLI for the billed generation pipeline.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cap_std::{ambient_authority, fs::Dir};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result, eyre};
use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig as _;
use photoshoot_backend::domain::ports::NoOpSettlementSideEffects;
use photoshoot_backend::domain::{
    Account, AccountAdminService, AccountId, EligibilityGate, GenerationLimiter,
    GenerationOrchestrator, GenerationService, GenerationServicePorts, PromoCode,
    PromoRedemptionOutcome, PromoService, ReferenceImage, ReportingService, Settlement,
    SettlementCoordinator, StyleId,
};
use photoshoot_backend::outbound::persistence::{
    DbPool, DieselLedgerStore, DieselOutcomeLog, DieselPromoStore, DieselStyleCatalog,
    PoolConfig, run_pending_migrations,
};
use photoshoot_backend::outbound::provider::HttpGenerationProvider;
use photoshoot_backend::settings::{PipelineConfig, PipelineSettings};
use photoshoot_backend::telemetry;
use tokio::runtime::Builder;
use tracing::info;

/// `photoshoot-backend` command arguments.
#[derive(Debug, Parser)]
#[command(
    name = "photoshoot-backend",
    about = "Run billed image generations and administer accounts and promo codes",
    version
)]
struct CliArgs {
    /// Database connection URL. Falls back to settings, then `DATABASE_URL`.
    #[arg(long = "database-url", value_name = "url", global = true)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    #[command(flatten)]
    Pooled(PooledCommand),
}

/// Commands that need a connection pool.
#[derive(Debug, Subcommand)]
enum PooledCommand {
    /// Generate one image for an account.
    Generate(GenerateArgs),
    /// Redeem a promo code for an account.
    Redeem {
        #[arg(long, value_name = "id")]
        account: i64,
        #[arg(long, value_name = "code")]
        code: String,
    },
    /// Manage promo codes.
    #[command(subcommand)]
    Promo(PromoCommand),
    /// Inspect and adjust accounts.
    #[command(subcommand)]
    Account(AccountCommand),
    /// Outcome totals for a recent window.
    Report {
        #[arg(long, value_name = "n", default_value_t = 1)]
        days: u32,
    },
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long, value_name = "id")]
    account: i64,
    #[arg(long, value_name = "id")]
    style: i64,
    /// Reference photo; repeat for several.
    #[arg(long = "image", value_name = "path", required = true)]
    images: Vec<PathBuf>,
    /// Where the generated image is written.
    #[arg(long, value_name = "path")]
    output: PathBuf,
}

#[derive(Debug, Subcommand)]
enum PromoCommand {
    /// Create a code.
    Create {
        #[arg(long, value_name = "code")]
        code: String,
        #[arg(long, value_name = "n")]
        generations: u32,
        #[arg(long, value_name = "n", default_value_t = 1)]
        uses: u32,
    },
    /// List codes, newest first.
    List,
    /// Re-enable a code.
    Activate {
        #[arg(long, value_name = "id")]
        id: i64,
    },
    /// Disable a code.
    Deactivate {
        #[arg(long, value_name = "id")]
        id: i64,
    },
    /// Delete a code and its redemptions.
    Delete {
        #[arg(long, value_name = "id")]
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
enum AccountCommand {
    /// Show balances and totals.
    Show {
        #[arg(long, value_name = "id")]
        account: i64,
    },
    /// Add or remove credits.
    Credits {
        #[arg(long, value_name = "id")]
        account: i64,
        #[arg(long, value_name = "delta", allow_negative_numbers = true)]
        delta: i64,
    },
    /// Add or remove balance.
    Balance {
        #[arg(long, value_name = "id")]
        account: i64,
        #[arg(long, value_name = "delta", allow_negative_numbers = true)]
        delta: i64,
    },
    /// Reset the balance to zero.
    ClearBalance {
        #[arg(long, value_name = "id")]
        account: i64,
    },
    /// Grant or revoke admin status.
    Admin {
        #[arg(long, value_name = "id")]
        account: i64,
        #[arg(long, value_name = "bool", action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Add balance worth `generations` generations.
    TopUp {
        #[arg(long, value_name = "id")]
        account: i64,
        #[arg(long, value_name = "n")]
        generations: u32,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    telemetry::init();
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("create Tokio runtime")?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = CliArgs::parse();
    let settings = PipelineSettings::load_from_iter([OsString::from("photoshoot-backend")])
        .wrap_err("load pipeline settings")?;
    let config = settings.runtime()?;
    let database_url = resolve_database_url(args.database_url, &settings)?;

    match args.command {
        Command::Migrate => migrate(database_url).await,
        Command::Pooled(command) => run_pooled(command, &settings, &config, &database_url).await,
    }
}

async fn migrate(database_url: String) -> Result<()> {
    let applied = tokio::task::spawn_blocking(move || run_pending_migrations(&database_url))
        .await
        .wrap_err("migration task panicked")??;
    println!("applied_migrations={}", applied.len());
    for version in applied {
        println!("migration={version}");
    }
    Ok(())
}

async fn run_pooled(
    command: PooledCommand,
    settings: &PipelineSettings,
    config: &PipelineConfig,
    database_url: &str,
) -> Result<()> {
    let pool = DbPool::new(
        PoolConfig::new(database_url).sized_for_generations(config.max_concurrent_generations),
    )
    .await
    .wrap_err("create database pool")?;
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let ledger = Arc::new(DieselLedgerStore::new(pool.clone(), clock.clone()));
    let outcome_log = Arc::new(DieselOutcomeLog::new(pool.clone(), clock.clone()));
    let price = config.service.price;

    match command {
        PooledCommand::Generate(generate) => {
            let service = generation_service(settings, config, pool, ledger, outcome_log, clock)?;
            run_generate(&service, generate).await
        }
        PooledCommand::Redeem { account, code } => {
            let promos = PromoService::new(
                Arc::new(DieselPromoStore::new(pool, clock)),
                price,
                config.promo_policy,
            );
            let outcome = promos.redeem(AccountId::new(account), &code).await?;
            print_redemption(outcome);
            Ok(())
        }
        PooledCommand::Promo(promo) => {
            let promos = PromoService::new(
                Arc::new(DieselPromoStore::new(pool, clock)),
                price,
                config.promo_policy,
            );
            run_promo(&promos, promo).await
        }
        PooledCommand::Account(account) => {
            let accounts = AccountAdminService::new(ledger, price);
            let reports = ReportingService::new(outcome_log, clock);
            run_account(&accounts, &reports, account).await
        }
        PooledCommand::Report { days } => {
            let report = ReportingService::new(outcome_log, clock)
                .report_last_days(days)
                .await?;
            println!("days={days}");
            println!("total={}", report.total);
            println!("succeeded={}", report.succeeded);
            println!("failed={}", report.failed);
            println!("charged_amount={}", report.charged_amount);
            println!("charged_credits={}", report.charged_credits);
            Ok(())
        }
    }
}

fn generation_service(
    settings: &PipelineSettings,
    config: &PipelineConfig,
    pool: DbPool,
    ledger: Arc<DieselLedgerStore>,
    outcome_log: Arc<DieselOutcomeLog>,
    clock: Arc<dyn Clock>,
) -> Result<GenerationService> {
    let provider = HttpGenerationProvider::new(settings.provider_endpoint()?, config.timeouts)
        .wrap_err("configure provider client")?;
    info!(endpoint = %provider.endpoint(), "provider configured");
    let orchestrator = GenerationOrchestrator::new(
        Arc::new(provider),
        GenerationLimiter::new(config.max_concurrent_generations),
        config.orchestrator.clone(),
    );
    Ok(GenerationService::new(
        GenerationServicePorts {
            styles: Arc::new(DieselStyleCatalog::new(pool)),
            gate: EligibilityGate::new(ledger),
            orchestrator: Arc::new(orchestrator),
            settlement: SettlementCoordinator::new(
                outcome_log,
                Arc::new(NoOpSettlementSideEffects),
                clock,
                config.provider_label.clone(),
            ),
        },
        config.service,
    ))
}

async fn run_generate(service: &GenerationService, args: GenerateArgs) -> Result<()> {
    let images = args
        .images
        .iter()
        .map(|path| read_reference_image(path))
        .collect::<Result<Vec<_>>>()?;
    let settlement = service
        .generate(AccountId::new(args.account), StyleId::new(args.style), images)
        .await?;

    let outcome = settlement.outcome().clone();
    println!("request_id={}", outcome.record.request_id);
    println!("status={}", outcome.record.status);
    println!("attempts={}", outcome.record.attempts);
    if let Settlement::Delivered { image, .. } = &settlement {
        write_output(&args.output, &image.bytes)?;
        println!("tier={}", image.tier);
        println!("media_type={}", image.media_type);
        println!("output={}", args.output.display());
    }
    settlement.into_delivery()?;
    Ok(())
}

async fn run_promo(promos: &PromoService, command: PromoCommand) -> Result<()> {
    match command {
        PromoCommand::Create {
            code,
            generations,
            uses,
        } => print_promo(&promos.create(&code, generations, uses).await?),
        PromoCommand::List => {
            for promo in promos.list().await? {
                print_promo(&promo);
            }
        }
        PromoCommand::Activate { id } => print_promo(&promos.set_active(id, true).await?),
        PromoCommand::Deactivate { id } => print_promo(&promos.set_active(id, false).await?),
        PromoCommand::Delete { id } => {
            promos.delete(id).await?;
            println!("deleted={id}");
        }
    }
    Ok(())
}

async fn run_account(
    accounts: &AccountAdminService,
    reports: &ReportingService,
    command: AccountCommand,
) -> Result<()> {
    let account = match command {
        AccountCommand::Show { account } => {
            let id = AccountId::new(account);
            let found = accounts.show(id).await?;
            let stats = reports.account_stats(id).await?;
            println!("spent_amount={}", stats.spent_amount);
            println!("generations_succeeded={}", stats.generations_succeeded);
            println!("generations_failed={}", stats.generations_failed);
            if let Some(at) = stats.last_generation_at {
                println!("last_generation_at={}", at.to_rfc3339());
            }
            found
        }
        AccountCommand::Credits { account, delta } => {
            accounts.adjust_credits(AccountId::new(account), delta).await?
        }
        AccountCommand::Balance { account, delta } => {
            accounts.adjust_balance(AccountId::new(account), delta).await?
        }
        AccountCommand::ClearBalance { account } => {
            accounts.clear_balance(AccountId::new(account)).await?
        }
        AccountCommand::Admin { account, enabled } => {
            accounts.set_admin(AccountId::new(account), enabled).await?
        }
        AccountCommand::TopUp {
            account,
            generations,
        } => {
            accounts
                .top_up_generations(AccountId::new(account), generations)
                .await?
        }
    };
    print_account(&account);
    Ok(())
}

fn print_account(account: &Account) {
    println!("account={}", account.id);
    println!("credits={}", account.credits);
    println!("balance={}", account.balance);
    println!("is_admin={}", account.is_admin);
}

fn print_promo(promo: &PromoCode) {
    println!(
        "promo id={} code={} generations={} remaining_uses={} active={}",
        promo.id, promo.code, promo.granted_generations, promo.remaining_uses, promo.is_active
    );
}

fn print_redemption(outcome: PromoRedemptionOutcome) {
    match outcome {
        PromoRedemptionOutcome::Redeemed {
            granted,
            generations,
        } => {
            println!("outcome=redeemed");
            println!("granted={granted}");
            println!("generations={generations}");
        }
        PromoRedemptionOutcome::AlreadyUsed => println!("outcome=already_used"),
        PromoRedemptionOutcome::Invalid => println!("outcome=invalid"),
    }
}

fn media_type_for(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let media_type = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => return None,
    };
    Some(media_type.to_owned())
}

fn open_parent(path: &Path) -> Result<(Dir, &Path)> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("path '{}' must name a file", path.display()))?;
    let directory = Dir::open_ambient_dir(parent, ambient_authority())
        .wrap_err_with(|| format!("open directory '{}'", parent.display()))?;
    Ok((directory, Path::new(file_name)))
}

fn read_reference_image(path: &Path) -> Result<ReferenceImage> {
    let (directory, file_name) = open_parent(path)?;
    let mut file = directory
        .open(file_name)
        .wrap_err_with(|| format!("open image '{}'", path.display()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .wrap_err_with(|| format!("read image '{}'", path.display()))?;
    if bytes.is_empty() {
        return Err(eyre!("image '{}' is empty", path.display()));
    }
    Ok(ReferenceImage::new(bytes, media_type_for(path)))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    let (directory, file_name) = open_parent(path)?;
    directory
        .write(file_name, bytes)
        .wrap_err_with(|| format!("write output '{}'", path.display()))
}

fn resolve_database_url(explicit: Option<String>, settings: &PipelineSettings) -> Result<String> {
    if let Some(value) = explicit {
        if value.trim().is_empty() {
            return Err(eyre!("--database-url must not be empty when provided"));
        }
        return Ok(value);
    }
    settings
        .database_url()
        .wrap_err("database URL missing: set --database-url, PHOTOSHOOT_DATABASE_URL or DATABASE_URL")
}

#[cfg(test)]
mod tests {
    //! Unit tests for CLI parsing and file helpers.

    use std::io::Write;

    use ortho_config::OrthoConfig as _;
    use rstest::rstest;
    use tempfile::{NamedTempFile, TempDir};

    use super::*;

    #[rstest]
    #[case::jpeg("photo.JPG", Some("image/jpeg"))]
    #[case::png("photo.png", Some("image/png"))]
    #[case::unknown("photo.bin", None)]
    #[case::bare("photo", None)]
    fn media_type_follows_extension(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            media_type_for(Path::new(path)).as_deref(),
            expected
        );
    }

    #[rstest]
    fn reference_images_are_read_from_disk() {
        let mut file = NamedTempFile::with_suffix(".png").expect("temp file");
        file.write_all(&[1, 2, 3]).expect("write");

        let image = read_reference_image(file.path()).expect("image reads");
        assert_eq!(image.bytes, vec![1, 2, 3]);
        assert_eq!(image.media_type, "image/png");
    }

    #[rstest]
    fn empty_reference_images_are_rejected() {
        let file = NamedTempFile::new().expect("temp file");
        let error = read_reference_image(file.path()).expect_err("empty");
        assert!(error.to_string().contains("is empty"));
    }

    #[rstest]
    fn output_is_written_inside_parent_directory() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("out.png");

        write_output(&path, &[9, 9]).expect("written");
        assert_eq!(std::fs::read(&path).expect("read back"), vec![9, 9]);
    }

    #[rstest]
    fn explicit_blank_database_url_is_rejected() {
        let settings = PipelineSettings::load_from_iter([OsString::from("photoshoot-backend")])
            .expect("settings load");
        let error = resolve_database_url(Some("  ".to_owned()), &settings).expect_err("blank");
        assert!(error.to_string().contains("must not be empty"));
    }

    #[rstest]
    fn explicit_database_url_wins() {
        let settings = PipelineSettings::load_from_iter([OsString::from("photoshoot-backend")])
            .expect("settings load");
        let url = resolve_database_url(Some("postgres://db/x".to_owned()), &settings)
            .expect("explicit url");
        assert_eq!(url, "postgres://db/x");
    }

    #[rstest]
    fn generate_accepts_repeated_images() {
        let args = CliArgs::try_parse_from([
            "photoshoot-backend",
            "generate",
            "--account",
            "7",
            "--style",
            "2",
            "--image",
            "a.jpg",
            "--image",
            "b.jpg",
            "--output",
            "out.png",
        ])
        .expect("arguments parse");
        let Command::Pooled(PooledCommand::Generate(generate)) = args.command else {
            panic!("expected generate");
        };
        assert_eq!(generate.images.len(), 2);
        assert_eq!(generate.account, 7);
    }

    #[rstest]
    fn negative_deltas_parse() {
        let args = CliArgs::try_parse_from([
            "photoshoot-backend",
            "account",
            "balance",
            "--account",
            "7",
            "--delta",
            "-25",
        ])
        .expect("arguments parse");
        assert!(matches!(
            args.command,
            Command::Pooled(PooledCommand::Account(AccountCommand::Balance {
                delta: -25,
                ..
            }))
        ));
    }

    #[rstest]
    fn generate_requires_an_image() {
        let result = CliArgs::try_parse_from([
            "photoshoot-backend",
            "generate",
            "--account",
            "7",
            "--style",
            "2",
            "--output",
            "out.png",
        ]);
        assert!(result.is_err());
    }
}
