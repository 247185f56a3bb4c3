//! cloaklink CLI - password-protected shareable links
//!
//! Builds encrypted links and their redirect-table entries, opens links
//! given a password, and renders the static redirect site.

use clap::{Parser, Subcommand, ValueEnum};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::process;

use cloaklink::attempt::{AttemptOutcome, DecryptSession};
use cloaklink::codec::Base64Mode;
use cloaklink::error::{ErrorCategory, ErrorKind, LinkError, Result};
use cloaklink::kdf::{KdfParams, PBKDF2_ITERATIONS};
use cloaklink::link_ops::{self, LinkFields};
use cloaklink::passphrase::{
    PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader, read_confirmed,
};
use cloaklink::payload::parse_link;
use cloaklink::site::{self, RedirectTable};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "cloaklink")]
#[command(version)]
#[command(about = "Password-protected shareable links.", long_about = None)]
struct Cli {
    /// Read password from stdin instead of from terminal
    #[arg(long, global = true, env = "CLOAKLINK_PASSPHRASE_STDIN")]
    passphrase_stdin: bool,

    /// PBKDF2 iteration count; must match what the unlock page uses
    #[arg(
        long,
        global = true,
        env = "CLOAKLINK_KDF_ITERATIONS",
        default_value_t = PBKDF2_ITERATIONS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    kdf_iterations: u32,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "CLOAKLINK_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Log output format
    #[arg(
        long,
        global = true,
        env = "CLOAKLINK_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a destination URL into a shareable link
    #[command(alias = "e")]
    Encrypt {
        /// Display name shown on the unlock page (not secret)
        #[arg(long)]
        name: String,

        /// Title for the redirect table entry (defaults to the name)
        #[arg(long, env = "CLOAKLINK_TITLE")]
        title: Option<String>,

        /// The secret destination URL
        #[arg(long, value_name = "URL")]
        url: String,

        /// Address of the unlock page
        #[arg(long, value_name = "URL", env = "CLOAKLINK_BASE_URL")]
        base_url: String,

        /// Write the redirect table entry to FILE instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Open a link with a password and print its destination
    #[command(alias = "o")]
    Open {
        /// The encrypted link
        link: String,

        /// Accept links with wrapped, unpadded or otherwise sloppy base64
        #[arg(long, env = "CLOAKLINK_LENIENT_BASE64")]
        lenient_base64: bool,

        /// Number of password prompts before giving up (terminal only)
        #[arg(
            long,
            env = "CLOAKLINK_TRIES",
            default_value_t = 3,
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        tries: u32,
    },

    /// Render redirect pages from a redirect table
    BuildSite {
        /// Path to the redirect table (TOML)
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Directory to write the site into
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Title of the index page
        #[arg(long, env = "CLOAKLINK_SITE_TITLE", default_value = "links")]
        site_title: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    let params = KdfParams {
        iterations: cli.kdf_iterations,
    };

    let result = match cli.command {
        Commands::Encrypt {
            name,
            title,
            url,
            base_url,
            output,
        } => {
            let fields = LinkFields {
                title: title.unwrap_or_else(|| name.clone()),
                name,
                destination: url,
                base_url,
            };
            encrypt(&fields, output, cli.passphrase_stdin, &params)
        }
        Commands::Open {
            link,
            lenient_base64,
            tries,
        } => {
            let mode = if lenient_base64 {
                Base64Mode::Lenient
            } else {
                Base64Mode::Strict
            };
            open(&link, mode, tries, cli.passphrase_stdin, params)
        }
        Commands::BuildSite {
            input,
            output,
            site_title,
        } => build_site(&input, &output, &site_title),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", describe(&e));
        process::exit(1);
    }
}

fn encrypt(
    fields: &LinkFields,
    output: Option<PathBuf>,
    use_stdin: bool,
    params: &KdfParams,
) -> Result<()> {
    let password = if use_stdin {
        stdin_reader().read_passphrase()?
    } else {
        read_confirmed(
            &mut TerminalPassphraseReader::new(),
            &mut TerminalPassphraseReader::with_prompt("Confirm password (cloaklink): "),
        )?
    };

    let published = link_ops::encrypt_link(fields, &password, params)?;

    match output {
        Some(path) => {
            link_ops::write_output(&path, format!("{}\n", published.config).as_bytes())?;
            println!("{}", published.url);
        }
        None => {
            println!("{}", published.url);
            println!();
            println!("{}", published.config);
        }
    }
    Ok(())
}

fn open(link: &str, mode: Base64Mode, tries: u32, use_stdin: bool, params: KdfParams) -> Result<()> {
    let payload = parse_link(link, mode).map_err(|e| {
        if e.is_invalid_link() {
            e.with_context("not a valid encrypted link")
        } else {
            e
        }
    })?;
    let session = DecryptSession::new(payload, params);
    tracing::info!(name = %session.payload().name, "opening link");

    let (mut reader, tries): (Box<dyn PassphraseReader>, u32) = if use_stdin {
        (Box::new(stdin_reader()), 1)
    } else {
        let prompt = format!("Password for {}: ", session.payload().name);
        (Box::new(TerminalPassphraseReader::with_prompt(prompt)), tries)
    };

    for _ in 0..tries {
        let password: Zeroizing<String> = reader.read_passphrase()?;
        match session.attempt(&password) {
            AttemptOutcome::Unlocked(destination) => {
                println!("{}", destination);
                return Ok(());
            }
            AttemptOutcome::Rejected | AttemptOutcome::Superseded => {}
        }
    }

    Err(LinkError::with_kind(
        ErrorCategory::User,
        ErrorKind::AuthenticationFailed,
        "password not accepted",
    ))
}

fn build_site(input: &Path, output: &Path, site_title: &str) -> Result<()> {
    let table = RedirectTable::load(input)?;
    let written = site::write_site(&table, output, site_title)?;
    tracing::info!(pages = written.len(), "site written");
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

fn stdin_reader() -> ReaderPassphraseReader {
    ReaderPassphraseReader::new(Box::new(std::io::stdin()))
}

/// User-facing text for an error. A rejected password never says more
/// than that; other errors show their cause chain.
fn describe(err: &LinkError) -> String {
    if err.kind == Some(ErrorKind::AuthenticationFailed) {
        return "password not accepted".to_string();
    }

    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        // Most messages already quote their immediate cause.
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
