use crate::{
    settings::Settings, signer::PromptSigner, AbortedSnafu, AccountSnafu, BackendSnafu, Error,
    PromptSnafu, PromptTaskSnafu, Result, SessionSnafu,
};
use dialoguer::Confirm;
use exchange_core::{
    backend::with_deadline, ExchangeBackend, ExchangeSession, SessionSnapshot, SessionState,
};
use exchange_models::{AccountId, Balance, PriceSnapshot, Quote, SettledAmounts, Side, Unit};
use snafu::ResultExt;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub async fn price(backend: Arc<dyn ExchangeBackend>, settings: &Settings) -> Result<()> {
    let timeout = settings.session_config().network_timeout;
    let prices = with_deadline(timeout, "Price request", backend.prices())
        .await
        .context(BackendSnafu)?;
    print_prices(&prices);
    Ok(())
}

pub async fn balance(
    backend: Arc<dyn ExchangeBackend>,
    settings: &Settings,
    account: &str,
) -> Result<()> {
    let account = AccountId::parse(account).context(AccountSnafu)?;
    let timeout = settings.session_config().network_timeout;
    let balance = with_deadline(timeout, "Balance request", backend.balance(&account))
        .await
        .context(BackendSnafu)?;
    print_balance(&balance);
    Ok(())
}

pub async fn quote(
    backend: Arc<dyn ExchangeBackend>,
    settings: &Settings,
    side: Side,
    unit: Unit,
    amount: &str,
) -> Result<()> {
    let session = open_session(backend, settings, side, unit).await?;
    let snapshot = request_quote(&session, settings, amount).await?;
    if let Some(quote) = &snapshot.quote {
        print_quote(quote, snapshot.remaining_seconds);
    }
    session.cancel().await;
    Ok(())
}

pub async fn trade(
    backend: Arc<dyn ExchangeBackend>,
    settings: &Settings,
    side: Side,
    unit: Unit,
    amount: Option<&str>,
    account: &str,
) -> Result<()> {
    let account = AccountId::parse(account).context(AccountSnafu)?;
    let session = open_session(backend, settings, side, unit).await?;

    let amount = match amount {
        Some(amount) => amount.to_string(),
        None => {
            let max = session.max_amount(&account).await.context(SessionSnafu)?;
            info!(%max, %unit, "Trading maximum amount");
            unit.format(max)
        }
    };

    let snapshot = request_quote(&session, settings, &amount).await?;
    let Some(quote) = snapshot.quote else {
        return AbortedSnafu {
            message: "No quote available",
        }
        .fail();
    };
    print_quote(&quote, snapshot.remaining_seconds);

    let prompt = format!("{} {} sGOLD for {} SOL?", side, quote.token_amount, quote.crypto_amount);
    if !confirm(prompt).await? {
        session.cancel().await;
        return AbortedSnafu {
            message: "Trade cancelled",
        }
        .fail();
    }

    session
        .confirm_settlement(account, Arc::new(PromptSigner))
        .await
        .context(SessionSnafu)?;

    // Signing waits on the operator, so there is no overall deadline here
    let snapshot = wait_for(&session, None, "settlement", |snapshot| {
        matches!(
            snapshot.state,
            SessionState::Succeeded | SessionState::Failed
        )
    })
    .await?;

    let settlement = snapshot.settlement.as_ref();
    match (snapshot.state, settlement.and_then(|s| s.receipt())) {
        (SessionState::Succeeded, Some(receipt)) => {
            println!("Exchange {} settled", receipt.exchange_id);
            println!("  Signature: {}", receipt.receipt_signature);
            match &receipt.amounts {
                SettledAmounts::Buy { token_minted } => {
                    println!("  Minted:    {} sGOLD", Unit::Token.format(*token_minted))
                }
                SettledAmounts::Sell {
                    token_burned,
                    base_crypto_received,
                } => {
                    println!("  Burned:    {} sGOLD", Unit::Token.format(*token_burned));
                    println!(
                        "  Received:  {} SOL",
                        Unit::BaseCrypto.format(*base_crypto_received)
                    );
                }
            }
            if let Some(message) = &receipt.message {
                println!("  {message}");
            }
            Ok(())
        }
        _ => {
            let exchange_id = settlement.and_then(|s| s.exchange_id);
            let message = snapshot
                .error
                .map(|failure| failure.to_string())
                .unwrap_or_else(|| "Settlement failed".to_string());
            warn!(?exchange_id, %message, "Trade failed");
            AbortedSnafu { message }.fail()
        }
    }
}

async fn open_session(
    backend: Arc<dyn ExchangeBackend>,
    settings: &Settings,
    side: Side,
    unit: Unit,
) -> Result<ExchangeSession> {
    let session =
        ExchangeSession::new(backend, settings.session_config()).context(SessionSnafu)?;
    if let Err(error) = session.refresh_prices().await {
        warn!(%error, "Continuing without display prices");
    }
    session.switch_side(side).await.context(SessionSnafu)?;
    session.set_input_unit(unit).await.context(SessionSnafu)?;
    Ok(session)
}

/// Enter `amount` and wait for the quote to land or fail.
async fn request_quote(
    session: &ExchangeSession,
    settings: &Settings,
    amount: &str,
) -> Result<SessionSnapshot> {
    let pair = session.set_amount(amount).await.context(SessionSnafu)?;
    if pair.fiat_value().is_zero() {
        return AbortedSnafu {
            message: format!("Nothing to quote for {amount:?}"),
        }
        .fail();
    }
    if !pair.derived_display.is_empty() {
        println!(
            "{} {} ≈ {} {}",
            pair.primary_input, pair.primary_unit, pair.derived_display, pair.derived_unit
        );
    }

    let config = settings.session_config();
    let deadline = config.debounce + config.network_timeout;
    let snapshot = wait_for(session, Some(deadline), "quote", |snapshot| {
        snapshot.state != SessionState::Quoting
    })
    .await?;

    match (&snapshot.quote, &snapshot.error) {
        (Some(_), _) => Ok(snapshot),
        (None, Some(failure)) => AbortedSnafu {
            message: failure.to_string(),
        }
        .fail(),
        (None, None) => AbortedSnafu {
            message: "Quote request produced no quote",
        }
        .fail(),
    }
}

async fn wait_for<F>(
    session: &ExchangeSession,
    deadline: Option<Duration>,
    waiting_for: &'static str,
    done: F,
) -> Result<SessionSnapshot>
where
    F: Fn(&SessionSnapshot) -> bool,
{
    let mut changes = session.subscribe();
    let wait = async {
        loop {
            let snapshot = session.snapshot().await;
            if done(&snapshot) {
                return Ok(snapshot);
            }
            if changes.changed().await.is_err() {
                return AbortedSnafu {
                    message: "Session closed",
                }
                .fail();
            }
        }
    };

    match deadline {
        Some(timeout) => tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::TimedOut {
                waiting_for,
                timeout,
            })?,
        None => wait.await,
    }
}

async fn confirm(prompt: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || Confirm::new().with_prompt(prompt).default(false).interact())
        .await
        .context(PromptTaskSnafu)?
        .context(PromptSnafu)
}

fn print_prices(prices: &PriceSnapshot) {
    println!("Gold:  ${} / oz", Unit::Fiat.format(prices.token_reference_price));
    println!("SOL:   ${}", Unit::Fiat.format(prices.base_crypto_price));
    println!("sGOLD: ${}", Unit::Fiat.format(prices.token_fiat_value));
    if let Some(value) = prices.token_value_in_crypto {
        println!("       {} SOL", Unit::BaseCrypto.format(value));
    }
    if !prices.system_initialized {
        println!("Token system not initialized");
    }
    println!("Updated {}", prices.last_updated.to_rfc3339());
}

fn print_balance(balance: &Balance) {
    println!("Account: {}", balance.account);
    println!("  SOL:   {}", Unit::BaseCrypto.format(balance.base_crypto_balance));
    println!(
        "  sGOLD: {} (≈ ${})",
        Unit::Token.format(balance.token_balance),
        Unit::Fiat.format(balance.estimated_fiat_value)
    );
    if !balance.system_initialized {
        println!("Token system not initialized");
    }
    if balance.recent_transactions.is_empty() {
        return;
    }
    println!("Recent exchanges:");
    for record in &balance.recent_transactions {
        println!(
            "  #{} {} {} SOL / {} sGOLD  {:?}  {}",
            record.id,
            record.side,
            Unit::BaseCrypto.format(record.crypto_amount),
            Unit::Token.format(record.token_amount),
            record.status,
            record.created_at.format("%Y-%m-%d %H:%M"),
        );
    }
}

fn print_quote(quote: &Quote, remaining_seconds: Option<i64>) {
    println!("Quote {}", quote.quote_id);
    println!("  Side:      {}", quote.side);
    println!("  Amount:    ${}", Unit::Fiat.format(quote.fiat_amount));
    println!("  SOL:       {}", Unit::BaseCrypto.format(quote.crypto_amount));
    println!("  sGOLD:     {}", Unit::Token.format(quote.token_amount));
    if let Some(rate) = quote.token_per_crypto() {
        println!("  Rate:      1 SOL = {} sGOLD", Unit::Token.format(rate));
    }
    for fee in &quote.fees.items {
        println!("  Fee {:<10}{} SOL", fee.name, Unit::BaseCrypto.format(fee.amount));
    }
    println!("  Total fee: {} SOL", Unit::BaseCrypto.format(quote.fees.total));
    if let Some(remaining) = remaining_seconds {
        println!("  Expires in {remaining}s");
    }
}
