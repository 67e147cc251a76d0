//! Configuration: CLI flags layered over environment variables (§3a, §6).
//!
//! There is no JSON config file here — everything past the four CLI flags
//! comes from the environment, `dotenvy`-loaded first so a `.env` file works
//! the same as exported variables.

use std::collections::HashMap;
use std::io::BufRead;
use std::net::IpAddr;
use std::path::PathBuf;

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use clap::Parser;
use rai_types::ChainId;
use url::Url;

const ALL_EVM_CHAINS: &[ChainId] = &[
    ChainId::Ethereum,
    ChainId::EthereumTestnet,
    ChainId::BinanceSmartChain,
    ChainId::BinanceSmartChainTestnet,
];

/// `<CHAIN>_*` environment variable prefix for each EVM chain this binary
/// knows about. Chains without an `_ENDPOINTS` value set are left
/// unconfigured and simply never get a ticker.
fn env_prefix(chain: ChainId) -> &'static str {
    match chain {
        ChainId::Ethereum => "ETH",
        ChainId::EthereumTestnet => "ETH_SEPOLIA",
        ChainId::BinanceSmartChain => "BSC",
        ChainId::BinanceSmartChainTestnet => "BSC_TESTNET",
        ChainId::RaicoinMainnet | ChainId::RaicoinTestnet => "",
    }
}

#[derive(Parser, Debug)]
#[command(name = "rai-validator")]
#[command(about = "Raicoin cross-chain bridge validator")]
struct CliArgs {
    /// Address to bind the client/node WebSocket listener to.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,
    /// Port to bind the client/node WebSocket listener to.
    #[arg(long, short = 'p', default_value_t = 8443)]
    port: u16,
    /// Redirect log output to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Print a fresh 43-character callback key and exit; does not start the
    /// server.
    #[arg(long)]
    key: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {0} is not valid: {1}")]
    Invalid(&'static str, String),
    #[error("failed to read private key from stdin: {0}")]
    KeyPrompt(#[from] std::io::Error),
    #[error("{0} endpoint list is empty")]
    NoEndpoints(&'static str),
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub evm_chain_id: u64,
    pub endpoints: Vec<Url>,
    pub confirmations: u64,
    pub period: std::time::Duration,
    pub core_address: Address,
    pub validator_address: Address,
    pub signer_key: Option<PrivateKeySigner>,
    pub core_abi_file: Option<PathBuf>,
    pub validator_abi_file: Option<PathBuf>,
    pub erc20_abi_file: Option<PathBuf>,
    pub erc721_abi_file: Option<PathBuf>,
    pub symbol_patch: HashMap<Address, String>,
}

impl ChainConfig {
    /// Parses each configured `*_ABI_FILE`, if any, and confirms it declares
    /// every function this adapter calls against that interface (§6). A file
    /// left unset skips validation for that interface entirely — only a
    /// file that's present and wrong is fatal.
    pub fn validate_abi_files(&self) -> Result<(), rai_evm::EvmError> {
        use rai_evm::contracts::{
            CORE_CONTRACT_FUNCTIONS, ERC20_META_FUNCTIONS, ERC721_META_FUNCTIONS, VALIDATOR_CONTRACT_FUNCTIONS,
            validate_abi_file,
        };
        for (path, expected) in [
            (&self.core_abi_file, CORE_CONTRACT_FUNCTIONS),
            (&self.validator_abi_file, VALIDATOR_CONTRACT_FUNCTIONS),
            (&self.erc20_abi_file, ERC20_META_FUNCTIONS),
            (&self.erc721_abi_file, ERC721_META_FUNCTIONS),
        ] {
            if let Some(path) = path {
                validate_abi_file(path, expected)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_file: Option<PathBuf>,
    pub debug: bool,
    pub test_mode: bool,
    /// Trust `CF-Connecting-IP` when resolving a peer's real address (§6 —
    /// the node-IP check must see through Cloudflare's proxy).
    pub use_cloudflare: bool,
    /// Trust `X-Real-IP` the same way, for deployments fronted by nginx
    /// instead of Cloudflare.
    pub use_nginx: bool,
    pub node_ip: IpAddr,
    pub node_callback_key: String,
    pub token_service_url: Url,
    pub chains: HashMap<ChainId, ChainConfig>,
    pub execute_proposals: bool,
    pub proposals_file: Option<PathBuf>,
    /// Per-IP token-bucket rate (§4.7, §5); `None` disables rate limiting.
    pub rate_limit_per_second: Option<u32>,
}

impl Config {
    /// Parses CLI flags, then loads `.env` and the rest of the environment.
    /// Returns `Ok(None)` when `--key` was passed: the key has already been
    /// printed to stdout and the caller should exit 0 without starting
    /// anything.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let cli = CliArgs::parse();
        if cli.key {
            println!("{}", generate_callback_key());
            return Ok(None);
        }
        dotenvy::dotenv().ok();

        let node_ip = env_ip_addr("NODE_IP")?;
        let node_callback_key = env_var("NODE_CALLBACK_KEY")?;
        if node_callback_key.len() != 43 {
            return Err(ConfigError::Invalid(
                "NODE_CALLBACK_KEY",
                "must be exactly 43 characters".to_string(),
            ));
        }
        let token_service_url = env_url("RAI_TOKEN_URL")?;
        let execute_proposals = env_bool("EXECUTE_PROPOSALS");
        let debug = env_bool("DEBUG");
        let test_mode = env_bool("TEST");
        let use_cloudflare = env_bool("USE_CLOUDFLARE");
        let use_nginx = env_bool("USE_NGINX");

        let mut chains = HashMap::new();
        for &chain in ALL_EVM_CHAINS {
            if let Some(cfg) = load_chain(chain)? {
                chains.insert(chain, cfg);
            }
        }

        Ok(Some(Config {
            host: cli.host,
            port: cli.port,
            log_file: cli.log_file,
            debug,
            test_mode,
            use_cloudflare,
            use_nginx,
            node_ip,
            node_callback_key,
            token_service_url,
            chains,
            execute_proposals,
            proposals_file: std::env::var("PROPOSALS_FILE").ok().map(PathBuf::from).or_else(|| {
                // Without an explicit `PROPOSALS_FILE`, fall back to a
                // `TEST=1`-gated filename: `proposals_test.json` vs `proposals.json`.
                Some(PathBuf::from(if test_mode { "proposals_test.json" } else { "proposals.json" }))
            }),
            rate_limit_per_second: std::env::var("RATE_LIMIT_PER_SECOND").ok().and_then(|s| s.parse().ok()),
        }))
    }
}

fn load_chain(chain: ChainId) -> Result<Option<ChainConfig>, ConfigError> {
    let prefix = env_prefix(chain);
    let endpoints_var = format!("{prefix}_ENDPOINTS");
    let Ok(raw_endpoints) = std::env::var(&endpoints_var) else {
        return Ok(None);
    };
    let endpoints: Vec<Url> = raw_endpoints
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Url::parse(s).map_err(|e| {
                ConfigError::Invalid("_ENDPOINTS", format!("{s}: {e}"))
            })
        })
        .collect::<Result<_, _>>()?;
    if endpoints.is_empty() {
        return Ok(None);
    }

    let evm_chain_id = rai_types::EvmChainId::for_chain(chain)
        .expect("ALL_EVM_CHAINS only lists chains with an EvmChainId")
        .0;

    let core_address = env_address(&format!("{prefix}_CORE_ADDRESS"))?;
    let validator_address = env_address(&format!("{prefix}_VALIDATOR_ADDRESS"))?;

    let confirmations = std::env::var(format!("{prefix}_CONFIRMATIONS"))
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| chain.confirmations());
    let period_secs: u64 = std::env::var(format!("{prefix}_PERIOD"))
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| chain.default_tick_period_secs());

    let signer_key = load_signer_key(&format!("{prefix}_SIGNER_PRIVATE_KEY"))?;

    let core_abi_file = std::env::var("EVM_CHAIN_CORE_ABI_FILE").ok().map(PathBuf::from);
    let validator_abi_file = std::env::var("EVM_CHAIN_VALIDATOR_ABI_FILE").ok().map(PathBuf::from);
    let erc20_abi_file = std::env::var("ERC20_ABI_FILE").ok().map(PathBuf::from);
    let erc721_abi_file = std::env::var("ERC721_ABI_FILE").ok().map(PathBuf::from);

    let symbol_patch = std::env::var(format!("{prefix}_SYMBOL_PATCH"))
        .ok()
        .map(|raw| parse_symbol_patch(&raw))
        .transpose()?
        .unwrap_or_default();

    Ok(Some(ChainConfig {
        chain_id: chain,
        evm_chain_id,
        endpoints,
        confirmations,
        period: std::time::Duration::from_secs(period_secs),
        core_address,
        validator_address,
        signer_key,
        core_abi_file,
        validator_abi_file,
        erc20_abi_file,
        erc721_abi_file,
        symbol_patch,
    }))
}

fn parse_symbol_patch(raw: &str) -> Result<HashMap<Address, String>, ConfigError> {
    let entries: HashMap<String, String> = serde_json::from_str(raw)
        .map_err(|e| ConfigError::Invalid("_SYMBOL_PATCH", e.to_string()))?;
    entries
        .into_iter()
        .map(|(addr, symbol)| {
            addr.parse::<Address>()
                .map(|a| (a, symbol))
                .map_err(|e| ConfigError::Invalid("_SYMBOL_PATCH", e.to_string()))
        })
        .collect()
}

/// Loads a 64-hex private key from `var`. The literal value `input` instead
/// triggers an interactive, echo-off prompt on stdin (a Unix `getpass`,
/// built on `libc` termios flags for operator-entered secrets).
fn load_signer_key(var: &str) -> Result<Option<PrivateKeySigner>, ConfigError> {
    let Ok(raw) = std::env::var(var) else {
        return Ok(None);
    };
    let hex = if raw == "input" {
        print!("Enter signer private key (hex, no echo): ");
        std::io::Write::flush(&mut std::io::stdout()).ok();
        prompt_no_echo()?
    } else {
        raw
    };
    let hex = hex.trim().trim_start_matches("0x");
    let signer = hex
        .parse::<PrivateKeySigner>()
        .map_err(|e| ConfigError::Invalid("_SIGNER_PRIVATE_KEY", e.to_string()))?;
    Ok(Some(signer))
}

#[cfg(unix)]
fn prompt_no_echo() -> Result<String, ConfigError> {
    use std::os::fd::AsRawFd;

    let stdin = std::io::stdin();
    let fd = stdin.as_raw_fd();
    let mut term = std::mem::MaybeUninit::<libc::termios>::uninit();
    // SAFETY: fd is a valid, live stdin descriptor for the duration of this call.
    let original = unsafe {
        libc::tcgetattr(fd, term.as_mut_ptr());
        term.assume_init()
    };
    let mut noecho = original;
    noecho.c_lflag &= !(libc::ECHO);
    // SAFETY: noecho is a valid termios obtained from tcgetattr above.
    unsafe {
        libc::tcsetattr(fd, libc::TCSANOW, &noecho);
    }
    let mut line = String::new();
    let result = std::io::BufReader::new(stdin.lock())
        .read_line(&mut line)
        .map_err(ConfigError::KeyPrompt);
    // SAFETY: original is the termios state captured from this same fd.
    unsafe {
        libc::tcsetattr(fd, libc::TCSANOW, &original);
    }
    println!();
    result?;
    Ok(line)
}

#[cfg(not(unix))]
fn prompt_no_echo() -> Result<String, ConfigError> {
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).map_err(ConfigError::KeyPrompt)?;
    Ok(line)
}

fn generate_callback_key() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn env_ip_addr(name: &'static str) -> Result<IpAddr, ConfigError> {
    env_var(name)?
        .parse()
        .map_err(|e: std::net::AddrParseError| ConfigError::Invalid(name, e.to_string()))
}

fn env_url(name: &'static str) -> Result<Url, ConfigError> {
    Url::parse(&env_var(name)?).map_err(|e| ConfigError::Invalid(name, e.to_string()))
}

fn env_address(name: &str) -> Result<Address, ConfigError> {
    let raw = std::env::var(name).map_err(|_| ConfigError::Missing(leak(name)))?;
    raw.parse::<Address>()
        .map_err(|e| ConfigError::Invalid(leak(name), e.to_string()))
}

fn env_bool(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(false)
}

/// `ConfigError::Invalid`/`Missing` carry `&'static str`; the fixed
/// environment variables above are literals, but per-chain variable names
/// are built at runtime, so this leaks them once at startup to fit the
/// same error shape rather than growing a second, owned-string variant.
fn leak(s: &str) -> &'static str {
    Box::leak(s.to_string().into_boxed_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_key_is_43_chars() {
        let key = generate_callback_key();
        assert_eq!(key.len(), 43);
    }

    #[test]
    fn symbol_patch_parses_address_map() {
        let raw = r#"{"0x0000000000000000000000000000000000000001":"PATCHED"}"#;
        let patch = parse_symbol_patch(raw).unwrap();
        assert_eq!(patch.len(), 1);
        assert_eq!(
            patch.get(&"0x0000000000000000000000000000000000000001".parse::<Address>().unwrap()),
            Some(&"PATCHED".to_string())
        );
    }
}
