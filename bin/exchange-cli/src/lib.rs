mod commands;
pub mod settings;
pub mod signer;

use clap::{Parser, Subcommand, ValueEnum};
use exchange_client::HttpExchangeClient;
use exchange_core::ExchangeBackend;
use exchange_models::{Side, Unit};
use settings::Settings;
use snafu::{prelude::*, ResultExt};
use std::{path::PathBuf, sync::Arc, time::Duration};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Logger error: {}", source))]
    Logger { source: common::InitLoggerError },

    #[snafu(display("Settings error: {}", source))]
    Settings { source: settings::SettingsError },

    #[snafu(display("Client error: {}", source))]
    Client { source: exchange_client::Error },

    #[snafu(display("{}", source))]
    Backend { source: exchange_core::BackendError },

    #[snafu(display("{}", source))]
    Session { source: exchange_core::SessionError },

    #[snafu(display("{}", source))]
    Account {
        source: exchange_models::AccountError,
    },

    #[snafu(display("Prompt failed: {}", source))]
    Prompt { source: dialoguer::Error },

    #[snafu(display("Prompt task failed: {}", source))]
    PromptTask { source: tokio::task::JoinError },

    #[snafu(display("Timed out after {}s waiting for {}", timeout.as_secs(), waiting_for))]
    TimedOut {
        waiting_for: &'static str,
        timeout: Duration,
    },

    #[snafu(display("{}", message))]
    Aborted { message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Parser, Debug)]
#[command(name = "exchange-cli")]
#[command(about = "Quote and settle sGOLD exchanges")]
pub struct Args {
    /// Exchange API root
    #[arg(
        long,
        env = "EXCHANGE_API_URL",
        default_value = "http://localhost:8000/api/v1/gold/"
    )]
    pub api_url: String,

    /// TOML file with session settings
    #[arg(long, env = "EXCHANGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show current gold and base crypto prices
    Price,
    /// Show an account's balances and recent exchanges
    Balance {
        /// Wallet address
        #[arg(long, env = "EXCHANGE_ACCOUNT")]
        account: String,
    },
    /// Request a quote without settling it
    Quote {
        #[arg(long, value_enum)]
        side: SideArg,
        #[arg(long)]
        amount: String,
        /// Unit the amount is given in
        #[arg(long, value_enum, default_value = "usd")]
        unit: UnitArg,
    },
    /// Quote, confirm, sign, and settle an exchange
    Trade {
        #[arg(long, value_enum)]
        side: SideArg,
        /// Amount to trade. Required unless --max is given
        #[arg(long, required_unless_present = "max")]
        amount: Option<String>,
        /// Trade the largest amount the balance allows
        #[arg(long, conflicts_with = "amount")]
        max: bool,
        #[arg(long, value_enum, default_value = "usd")]
        unit: UnitArg,
        /// Wallet address
        #[arg(long, env = "EXCHANGE_ACCOUNT")]
        account: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SideArg {
    Buy,
    Sell,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Buy => Side::Buy,
            SideArg::Sell => Side::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum UnitArg {
    /// Fiat
    Usd,
    /// Base crypto on buys, tokens on sells
    Paired,
}

impl UnitArg {
    fn for_side(self, side: Side) -> Unit {
        match self {
            UnitArg::Usd => Unit::Fiat,
            UnitArg::Paired => side.paired_unit(),
        }
    }
}

pub async fn run(args: Args) -> Result<()> {
    let settings = Settings::load(args.config.as_deref()).context(SettingsSnafu)?;
    let client = HttpExchangeClient::new(&args.api_url).context(ClientSnafu)?;
    let backend: Arc<dyn ExchangeBackend> = Arc::new(client);

    match args.command {
        Command::Price => commands::price(backend, &settings).await,
        Command::Balance { account } => commands::balance(backend, &settings, &account).await,
        Command::Quote { side, amount, unit } => {
            let side = Side::from(side);
            commands::quote(backend, &settings, side, unit.for_side(side), &amount).await
        }
        Command::Trade {
            side,
            amount,
            max,
            unit,
            account,
        } => {
            let side = Side::from(side);
            let amount = if max { None } else { amount };
            commands::trade(
                backend,
                &settings,
                side,
                unit.for_side(side),
                amount.as_deref(),
                &account,
            )
            .await
        }
    }
}
