use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vbd",
    about = "Versioned Blob Directory: contract versions over a content-addressed blob store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Metadata document, overriding the configuration
    #[arg(long, global = true)]
    pub metadata: Option<PathBuf>,

    /// Keep blobs in process memory instead of calling the walrus CLI (serve only)
    #[arg(long, global = true)]
    pub memory_store: bool,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List clients with their contracts and versions
    Clients(ClientsArgs),
    /// Register a new client
    Register(RegisterArgs),
    /// Create a contract, or a further lineage in one, from a file
    Create(CreateArgs),
    /// Upload a file as the successor of an existing version
    Upload(UploadArgs),
    /// Query a client's version history
    Query(QueryArgs),
    /// Acknowledge a signature on a version
    Sign(SignArgs),
    /// Fetch the bytes of a version
    Fetch(FetchArgs),
    /// Re-validate the metadata document
    Verify(VerifyArgs),
    /// Start the HTTP server
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct ClientsArgs {}

#[derive(Args)]
pub struct RegisterArgs {
    pub name: String,
    /// Client id; a UUID v7 is generated when omitted
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Args)]
pub struct CreateArgs {
    pub client: String,
    pub file: PathBuf,
    #[arg(long)]
    pub contract: Option<String>,
    #[arg(long, default_value = "default name")]
    pub name: String,
    #[arg(long, default_value = "")]
    pub alias: String,
    /// Start an independent lineage in the existing `--contract`
    #[arg(long, requires = "contract")]
    pub lineage: bool,
}

#[derive(Args)]
pub struct UploadArgs {
    pub client: String,
    /// Blob id of the version being succeeded
    pub base: String,
    pub file: PathBuf,
}

#[derive(Args)]
pub struct QueryArgs {
    pub client: String,
    /// Earliest observation time, milliseconds since the UNIX epoch
    #[arg(long)]
    pub after: Option<u64>,
    /// Latest observation time, milliseconds since the UNIX epoch
    #[arg(long)]
    pub before: Option<u64>,
    #[arg(long)]
    pub ordinal: Option<u32>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args)]
pub struct SignArgs {
    pub client: String,
    pub contract: String,
    pub version: String,
    #[arg(long)]
    pub signer: String,
}

#[derive(Args)]
pub struct FetchArgs {
    pub client: String,
    pub version: String,
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct VerifyArgs {}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_clients() {
        let cli = Cli::try_parse_from(["vbd", "clients"]).unwrap();
        assert!(matches!(cli.command, Command::Clients(_)));
    }

    #[test]
    fn parse_register_with_id() {
        let cli = Cli::try_parse_from(["vbd", "register", "Acme", "--id", "C1"]).unwrap();
        if let Command::Register(args) = cli.command {
            assert_eq!(args.name, "Acme");
            assert_eq!(args.id, Some("C1".into()));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_create_defaults() {
        let cli = Cli::try_parse_from(["vbd", "create", "C1", "lease.pdf"]).unwrap();
        if let Command::Create(args) = cli.command {
            assert_eq!(args.file, PathBuf::from("lease.pdf"));
            assert_eq!(args.name, "default name");
            assert_eq!(args.alias, "");
            assert!(args.contract.is_none());
            assert!(!args.lineage);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn lineage_requires_contract() {
        assert!(Cli::try_parse_from(["vbd", "create", "C1", "a.pdf", "--lineage"]).is_err());
        let cli = Cli::try_parse_from([
            "vbd", "create", "C1", "a.pdf", "--lineage", "--contract", "K1",
        ])
        .unwrap();
        if let Command::Create(args) = cli.command {
            assert!(args.lineage);
            assert_eq!(args.contract, Some("K1".into()));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_upload() {
        let cli = Cli::try_parse_from(["vbd", "upload", "C1", "b0", "v2.pdf"]).unwrap();
        if let Command::Upload(args) = cli.command {
            assert_eq!(args.client, "C1");
            assert_eq!(args.base, "b0");
            assert_eq!(args.file, PathBuf::from("v2.pdf"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_query_filters() {
        let cli = Cli::try_parse_from([
            "vbd", "query", "C1", "--after", "15", "--before", "25", "--ordinal", "2",
        ])
        .unwrap();
        if let Command::Query(args) = cli.command {
            assert_eq!(args.after, Some(15));
            assert_eq!(args.before, Some(25));
            assert_eq!(args.ordinal, Some(2));
            assert!(args.description.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_sign_requires_signer() {
        assert!(Cli::try_parse_from(["vbd", "sign", "C1", "K1", "b0"]).is_err());
        let cli = Cli::try_parse_from(["vbd", "sign", "C1", "K1", "b0", "--signer", "alice"]).unwrap();
        if let Command::Sign(args) = cli.command {
            assert_eq!(args.signer, "alice");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_fetch_out() {
        let cli = Cli::try_parse_from(["vbd", "fetch", "C1", "b0", "-o", "out.pdf"]).unwrap();
        if let Command::Fetch(args) = cli.command {
            assert_eq!(args.out, Some(PathBuf::from("out.pdf")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_verify() {
        let cli = Cli::try_parse_from(["vbd", "verify"]).unwrap();
        assert!(matches!(cli.command, Command::Verify(_)));
    }

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["vbd", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind, Some("0.0.0.0:8080".parse().unwrap()));
        } else { panic!("wrong command"); }
        assert!(Cli::try_parse_from(["vbd", "serve", "--bind", "nowhere"]).is_err());
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from([
            "vbd", "clients", "--verbose", "--format", "json", "--metadata", "db.json", "--memory-store",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.metadata, Some(PathBuf::from("db.json")));
        assert!(cli.memory_store);
        assert!(cli.config.is_none());
    }
}
