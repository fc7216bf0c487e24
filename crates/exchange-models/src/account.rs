use serde::{Deserialize, Serialize};
use snafu::{ensure, Snafu};
use std::fmt;

const MIN_ACCOUNT_LEN: usize = 32;
const MAX_ACCOUNT_LEN: usize = 44;

#[derive(Debug, Snafu)]
pub enum AccountError {
    #[snafu(display("Invalid account address {:?}: expected {}-{} base58 characters", address, MIN_ACCOUNT_LEN, MAX_ACCOUNT_LEN))]
    InvalidAddress { address: String },
}

/// Ledger address of the user's wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn parse(address: impl Into<String>) -> Result<Self, AccountError> {
        let address = address.into();
        ensure!(
            (MIN_ACCOUNT_LEN..=MAX_ACCOUNT_LEN).contains(&address.len())
                && address.chars().all(is_base58_char),
            InvalidAddressSnafu { address }
        );
        Ok(Self(address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_base58_char(c: char) -> bool {
    c.is_ascii_alphanumeric() && !matches!(c, '0' | 'O' | 'I' | 'l')
}

impl TryFrom<String> for AccountId {
    type Error = AccountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
