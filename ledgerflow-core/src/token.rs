use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::id::StateRef;
use crate::identity::Party;

/// Ownership record for a quantity of a fungible, identifiable asset
/// (e.g. a security identified by its CUSIP).
///
/// Tokens are immutable. A later transaction supersedes a token by consuming
/// it as an input and producing new outputs. Deserialization runs the same
/// checks as [`Token::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawToken")]
pub struct Token {
    /// Security identifier of the asset
    asset_id: String,

    /// Number of units held, always positive
    quantity: u64,

    /// Current holder of the units
    owner: Party,

    /// Party that brought the units into existence
    issuer: Party,

    /// Parties entitled to see and consent to changes of this token.
    /// May contain duplicates; consumers deduplicate.
    participants: Vec<Party>,
}

/// Token as it appears on the wire, before validation
#[derive(Deserialize)]
struct RawToken {
    asset_id: String,
    quantity: u64,
    owner: Party,
    issuer: Party,
    participants: Vec<Party>,
}

impl TryFrom<RawToken> for Token {
    type Error = TokenError;

    fn try_from(raw: RawToken) -> Result<Self, Self::Error> {
        let token = Self {
            asset_id: raw.asset_id,
            quantity: raw.quantity,
            owner: raw.owner,
            issuer: raw.issuer,
            participants: raw.participants,
        };
        token.validate()?;
        Ok(token)
    }
}

impl Token {
    /// Create a new token, checking its invariants
    pub fn new(
        asset_id: impl Into<String>,
        quantity: i64,
        owner: Party,
        issuer: Party,
        participants: Vec<Party>,
    ) -> Result<Self, TokenError> {
        let token = Self {
            asset_id: asset_id.into(),
            quantity: u64::try_from(quantity).unwrap_or(0),
            owner,
            issuer,
            participants,
        };

        token.validate().map_err(|err| match err {
            TokenError::NonPositiveQuantity(_) => TokenError::NonPositiveQuantity(quantity),
            other => other,
        })?;
        Ok(token)
    }

    /// Check the invariants every token holds
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.asset_id.trim().is_empty() {
            return Err(TokenError::EmptyAssetId);
        }
        if self.quantity == 0 {
            return Err(TokenError::NonPositiveQuantity(0));
        }
        if self.participants.is_empty() {
            return Err(TokenError::NoParticipants);
        }
        if !self.participants.contains(&self.owner) {
            return Err(TokenError::OwnerNotParticipant(self.owner.clone()));
        }
        Ok(())
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn owner(&self) -> &Party {
        &self.owner
    }

    pub fn issuer(&self) -> &Party {
        &self.issuer
    }

    pub fn participants(&self) -> &[Party] {
        &self.participants
    }

    /// The same holding transferred to `new_owner`.
    ///
    /// The issuer stays a participant so it keeps visibility of its units.
    pub fn with_owner(&self, new_owner: Party) -> Self {
        let mut participants = vec![new_owner.clone()];
        if self.issuer != new_owner {
            participants.push(self.issuer.clone());
        }

        Self {
            asset_id: self.asset_id.clone(),
            quantity: self.quantity,
            owner: new_owner,
            issuer: self.issuer.clone(),
            participants,
        }
    }
}

/// A finalized token together with the notary that governs it and the
/// reference used to consume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef {
    pub state: Token,
    pub notary: Party,
    pub state_ref: StateRef,
}

impl StateAndRef {
    pub fn new(state: Token, notary: Party, state_ref: StateRef) -> Self {
        Self {
            state,
            notary,
            state_ref,
        }
    }
}
