use std::io::Write;
use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;
use vbd_core::{
    BlobId, ClientSummary, ContractQuery, Directory, ObservedAt, QueryOptions, SignatureRequest,
    TimeRange, UploadOutcome,
};
use vbd_server::{directory_for, ServerConfig, ServerError, ServerResult, VbdServer};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let json = matches!(cli.format, OutputFormat::Json);
    match execute(cli).await {
        Ok(()) => Ok(()),
        Err(e) if json => {
            println!("{}", serde_json::to_string_pretty(&e.to_failure())?);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

async fn execute(cli: Cli) -> ServerResult<()> {
    let config = load_config(&cli)?;
    let out = Output { json: matches!(cli.format, OutputFormat::Json) };
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args).await,
        command if config.memory_store && moves_blobs(&command) => Err(ServerError::BadRequest(
            "--memory-store only applies to serve; blob commands need the walrus CLI".into(),
        )),
        command => run_local(&directory_for(&config), out, command).await,
    }
}

/// Whether `command` stores or reads blob content.
fn moves_blobs(command: &Command) -> bool {
    matches!(command, Command::Create(_) | Command::Upload(_) | Command::Fetch(_))
}

async fn run_local(directory: &Directory, out: Output, command: Command) -> ServerResult<()> {
    match command {
        Command::Clients(_) => cmd_clients(directory, out).await,
        Command::Register(args) => cmd_register(directory, out, args).await,
        Command::Create(args) => cmd_create(directory, out, args).await,
        Command::Upload(args) => cmd_upload(directory, out, args).await,
        Command::Query(args) => cmd_query(directory, out, args).await,
        Command::Sign(args) => cmd_sign(directory, out, args).await,
        Command::Fetch(args) => cmd_fetch(directory, args).await,
        Command::Verify(_) => cmd_verify(directory, out).await,
        Command::Serve(_) => Err(ServerError::Internal("serve is not a local command".into())),
    }
}

/// Configuration file, if any, with command-line overrides applied.
fn load_config(cli: &Cli) -> ServerResult<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(path) = &cli.metadata {
        config.directory.metadata_path = path.clone();
    }
    if cli.memory_store {
        config.memory_store = true;
    }
    Ok(config)
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(&self, value: &T) -> ServerResult<()> {
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        println!("{text}");
        Ok(())
    }
}

fn blob_id(raw: &str) -> ServerResult<BlobId> {
    BlobId::new(raw).map_err(|e| ServerError::BadRequest(e.to_string()))
}

async fn read_file(path: &std::path::Path) -> ServerResult<Vec<u8>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ServerError::BadRequest(format!("cannot read {}: {e}", path.display())))?;
    if bytes.is_empty() {
        return Err(ServerError::BadRequest(format!("{} is empty", path.display())));
    }
    Ok(bytes)
}

async fn cmd_clients(directory: &Directory, out: Output) -> ServerResult<()> {
    let clients = directory.list_clients().await?;
    if out.json {
        return out.emit(&clients);
    }
    if clients.is_empty() {
        println!("No clients.");
    }
    for client in &clients {
        print_client(client);
    }
    Ok(())
}

fn print_client(client: &ClientSummary) {
    println!("{} {}", client.client_id.yellow().bold(), client.name);
    for contract in &client.contracts {
        println!("  {} {}", contract.contract_id.cyan(), contract.name);
        for version in &contract.versions {
            let alias = if version.alias.is_empty() { "-" } else { version.alias.as_str() };
            println!(
                "    {} {} {}",
                format!("v{}", version.ordinal).bold(),
                version.blob_id.to_string().dimmed(),
                alias
            );
        }
    }
}

async fn cmd_register(directory: &Directory, out: Output, args: RegisterArgs) -> ServerResult<()> {
    let client = directory.register_client(&args.name, args.id.as_deref()).await?;
    if out.json {
        return out.emit(&ClientSummary::from(&client));
    }
    println!("{} Registered client {}", "✓".green().bold(), client.client_id.yellow());
    Ok(())
}

async fn cmd_create(directory: &Directory, out: Output, args: CreateArgs) -> ServerResult<()> {
    let bytes = read_file(&args.file).await?;
    let outcome = match (&args.contract, args.lineage) {
        (Some(contract), true) => {
            directory
                .start_lineage(&args.client, contract, &args.alias, &bytes)
                .await?
        }
        (contract, _) => {
            directory
                .create_contract(&args.client, contract.as_deref(), &args.name, &args.alias, &bytes)
                .await?
        }
    };
    print_outcome(out, &outcome)
}

async fn cmd_upload(directory: &Directory, out: Output, args: UploadArgs) -> ServerResult<()> {
    let base = blob_id(&args.base)?;
    let bytes = read_file(&args.file).await?;
    let outcome = directory
        .upload_new_version_bytes(&bytes, &args.client, &base)
        .await?;
    print_outcome(out, &outcome)
}

fn print_outcome(out: Output, outcome: &UploadOutcome) -> ServerResult<()> {
    if out.json {
        return out.emit(outcome);
    }
    match outcome {
        UploadOutcome::Created(record) => {
            println!("{} Version {} stored", "✓".green().bold(), format!("v{}", record.ordinal()).bold());
            println!("  Blob: {}", record.current_blob().id.to_string().yellow());
            if let Some(parent) = record.parent() {
                println!("  Parent: {}", parent.id.to_string().dimmed());
            }
        }
        UploadOutcome::Deduplicated(record) => {
            println!(
                "{} Content already stored as {}; no new version recorded",
                "=".cyan().bold(),
                record.current_blob().id.to_string().yellow()
            );
        }
    }
    Ok(())
}

pub(crate) fn query_options(args: &QueryArgs) -> QueryOptions {
    let mut options = QueryOptions::new();
    if args.after.is_some() || args.before.is_some() {
        options = options.with_time_range(TimeRange {
            after: args.after.map(ObservedAt::from_millis),
            before: args.before.map(ObservedAt::from_millis),
        });
    }
    if let Some(ordinal) = args.ordinal {
        options = options.with_ordinal(ordinal);
    }
    if let Some(description) = &args.description {
        options = options.with_description(description.clone());
    }
    options
}

async fn cmd_query(directory: &Directory, out: Output, args: QueryArgs) -> ServerResult<()> {
    let result = directory.get_contracts(&args.client, &query_options(&args)).await?;
    if out.json {
        return out.emit(&result);
    }
    print_query(&result);
    Ok(())
}

fn print_query(result: &ContractQuery) {
    if result.contracts.is_empty() {
        println!("No matching versions.");
    }
    for contract in &result.contracts {
        println!("{} {}", contract.contract_id.cyan().bold(), contract.name);
        for version in contract.versions() {
            let blob = version.current_blob();
            println!(
                "  {} {} observed {}",
                format!("v{}", version.ordinal()).bold(),
                blob.id.to_string().yellow(),
                blob.observed_at
            );
            for ack in version.acknowledgments() {
                println!("    signed by {} at {}", ack.signer.green(), ack.acknowledged_at);
            }
        }
    }
    for ignored in &result.ignored {
        println!("{} filter ignored: {ignored:?}", "!".yellow());
    }
}

async fn cmd_sign(directory: &Directory, out: Output, args: SignArgs) -> ServerResult<()> {
    let request = SignatureRequest {
        client_id: args.client,
        contract_id: args.contract,
        version_blob_id: blob_id(&args.version)?,
        signer: args.signer,
    };
    let receipt = directory.acknowledge_signature(request).await?;
    if out.json {
        return out.emit(&receipt);
    }
    println!("{} {}", "✓".green().bold(), receipt.message);
    Ok(())
}

async fn cmd_fetch(directory: &Directory, args: FetchArgs) -> ServerResult<()> {
    let bytes = directory.fetch_version(&args.client, &blob_id(&args.version)?).await?;
    match &args.out {
        Some(path) => {
            tokio::fs::write(path, &bytes).await?;
            eprintln!("{} Wrote {} bytes to {}", "✓".green().bold(), bytes.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn cmd_verify(directory: &Directory, out: Output) -> ServerResult<()> {
    directory.verify().await?;
    if out.json {
        return out.emit(&serde_json::json!({ "status": "ok" }));
    }
    println!("{} Metadata verified.", "✓".green().bold());
    Ok(())
}

async fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> ServerResult<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    let directory = Arc::new(directory_for(&config));
    VbdServer::new(config, directory).serve().await
}
