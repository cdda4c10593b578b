use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::error::ProposalError;
use crate::id::{StateRef, TransactionId};
use crate::identity::Party;
use crate::outcome::RejectionReason;
use crate::token::{StateAndRef, Token};

/// Half-open validity interval `[from, until)` of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeWindow")]
pub struct TimeWindow {
    from: DateTime<Utc>,
    until: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawTimeWindow {
    from: DateTime<Utc>,
    until: DateTime<Utc>,
}

impl TryFrom<RawTimeWindow> for TimeWindow {
    type Error = ProposalError;

    fn try_from(raw: RawTimeWindow) -> Result<Self, Self::Error> {
        TimeWindow::between(raw.from, raw.until)
    }
}

impl TimeWindow {
    /// Create a window, requiring `until` to be strictly after `from`
    pub fn between(from: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self, ProposalError> {
        if until <= from {
            return Err(ProposalError::InvalidWindow {
                from: from.to_rfc3339(),
                until: until.to_rfc3339(),
            });
        }
        Ok(Self { from, until })
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn until(&self) -> DateTime<Utc> {
        self.until
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.from <= now && now < self.until
    }

    /// Check `now` against the window the way a notary does
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), RejectionReason> {
        if now < self.from {
            Err(RejectionReason::WindowNotYetValid)
        } else if now >= self.until {
            Err(RejectionReason::WindowExpired)
        } else {
            Ok(())
        }
    }
}

/// Intent marker of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandKind {
    /// Mint new tokens, no inputs
    Create,
    /// Transfer existing tokens to a new owner
    Move,
}

/// A command and the parties that must sign for it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub signatories: BTreeSet<Party>,
}

impl Command {
    /// Create a command; duplicate signatories collapse into one
    pub fn new(kind: CommandKind, signatories: impl IntoIterator<Item = Party>) -> Self {
        Self {
            kind,
            signatories: signatories.into_iter().collect(),
        }
    }
}

/// An unsigned, self-consistent transaction proposal.
///
/// Proposals come from [`TransactionBuilder::build`] or from deserialization,
/// and both run [`TransactionProposal::validate`]. Every proposal therefore
/// satisfies the structural invariants: required signatories are exactly the
/// union of command signatories, every input is governed by `notary`, and the
/// id hashes from the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTransactionProposal")]
pub struct TransactionProposal {
    id: TransactionId,
    notary: Party,
    time_window: TimeWindow,
    inputs: Vec<StateAndRef>,
    outputs: Vec<Token>,
    commands: BTreeSet<Command>,
    required_signatories: BTreeSet<Party>,
}

#[derive(Deserialize)]
struct RawTransactionProposal {
    id: TransactionId,
    notary: Party,
    time_window: TimeWindow,
    inputs: Vec<StateAndRef>,
    outputs: Vec<Token>,
    commands: BTreeSet<Command>,
    required_signatories: BTreeSet<Party>,
}

impl TryFrom<RawTransactionProposal> for TransactionProposal {
    type Error = ProposalError;

    fn try_from(raw: RawTransactionProposal) -> Result<Self, Self::Error> {
        let proposal = Self {
            id: raw.id,
            notary: raw.notary,
            time_window: raw.time_window,
            inputs: raw.inputs,
            outputs: raw.outputs,
            commands: raw.commands,
            required_signatories: raw.required_signatories,
        };
        proposal.validate()?;
        Ok(proposal)
    }
}

/// Order-independent view of a proposal used for hashing.
///
/// Sets are already sorted by their `BTreeSet` ordering. Token participants
/// are reduced to a sorted set, so listing them differently does not change
/// the id.
#[derive(Serialize)]
struct CanonicalProposal<'a> {
    notary: &'a Party,
    valid_from_micros: i64,
    valid_until_micros: i64,
    inputs: Vec<&'a StateRef>,
    outputs: Vec<CanonicalToken<'a>>,
    commands: &'a BTreeSet<Command>,
    required_signatories: &'a BTreeSet<Party>,
}

#[derive(Serialize)]
struct CanonicalToken<'a> {
    asset_id: &'a str,
    quantity: u64,
    owner: &'a Party,
    issuer: &'a Party,
    participants: BTreeSet<&'a Party>,
}

impl TransactionProposal {
    /// The transaction id, computed when the proposal was built
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn notary(&self) -> &Party {
        &self.notary
    }

    pub fn time_window(&self) -> &TimeWindow {
        &self.time_window
    }

    pub fn inputs(&self) -> &[StateAndRef] {
        &self.inputs
    }

    /// References of all consumed inputs, in order
    pub fn input_refs(&self) -> Vec<StateRef> {
        self.inputs.iter().map(|input| input.state_ref).collect()
    }

    pub fn outputs(&self) -> &[Token] {
        &self.outputs
    }

    pub fn commands(&self) -> &BTreeSet<Command> {
        &self.commands
    }

    pub fn required_signatories(&self) -> &BTreeSet<Party> {
        &self.required_signatories
    }

    /// Reference to the output at `index` once this transaction is finalized
    pub fn output_ref(&self, index: u32) -> Option<StateAndRef> {
        self.outputs.get(index as usize).map(|token| {
            StateAndRef::new(
                token.clone(),
                self.notary.clone(),
                StateRef::new(self.id, index),
            )
        })
    }

    /// Canonical, order-independent encoding of the proposal
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, ProposalError> {
        let canonical = CanonicalProposal {
            notary: &self.notary,
            valid_from_micros: self.time_window.from.timestamp_micros(),
            valid_until_micros: self.time_window.until.timestamp_micros(),
            inputs: self.inputs.iter().map(|input| &input.state_ref).collect(),
            outputs: self
                .outputs
                .iter()
                .map(|token| CanonicalToken {
                    asset_id: token.asset_id(),
                    quantity: token.quantity(),
                    owner: token.owner(),
                    issuer: token.issuer(),
                    participants: token.participants().iter().collect(),
                })
                .collect(),
            commands: &self.commands,
            required_signatories: &self.required_signatories,
        };

        Ok(bincode::serialize(&canonical)?)
    }

    /// Recompute the id from the current contents.
    ///
    /// A proposal received over the wire must hash to the id it claims.
    pub fn recompute_id(&self) -> Result<TransactionId, ProposalError> {
        Ok(TransactionId::from_canonical_bytes(&self.canonical_bytes()?))
    }

    /// Check the structural invariants, in the order the builder reports them
    pub fn validate(&self) -> Result<(), ProposalError> {
        if self.outputs.is_empty() {
            return Err(ProposalError::NoOutputs);
        }
        if self.commands.is_empty() {
            return Err(ProposalError::NoCommands);
        }

        let mut seen = HashSet::with_capacity(self.inputs.len());
        for input in &self.inputs {
            if !seen.insert(input.state_ref) {
                return Err(ProposalError::DuplicateInput(input.state_ref));
            }
            if input.notary != self.notary {
                return Err(ProposalError::NotaryMismatch {
                    input: input.state_ref,
                    input_notary: input.notary.clone(),
                    notary: self.notary.clone(),
                });
            }
        }

        if self.required_signatories != signatories_of(&self.commands) {
            return Err(ProposalError::SignatoryMismatch);
        }

        for (index, output) in self.outputs.iter().enumerate() {
            output
                .validate()
                .map_err(|source| ProposalError::InvalidOutput { index, source })?;
        }

        if self.time_window.until <= self.time_window.from {
            return Err(ProposalError::InvalidWindow {
                from: self.time_window.from.to_rfc3339(),
                until: self.time_window.until.to_rfc3339(),
            });
        }

        let actual = self.recompute_id()?;
        if actual != self.id {
            return Err(ProposalError::IdMismatch {
                claimed: self.id,
                actual,
            });
        }

        Ok(())
    }
}

/// Union of the signatories of `commands`
fn signatories_of(commands: &BTreeSet<Command>) -> BTreeSet<Party> {
    commands
        .iter()
        .flat_map(|command| command.signatories.iter().cloned())
        .collect()
}

/// Assembles a [`TransactionProposal`] step by step
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    notary: Option<Party>,
    time_window: Option<TimeWindow>,
    inputs: Vec<StateAndRef>,
    outputs: Vec<Token>,
    commands: BTreeSet<Command>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_notary(mut self, notary: Party) -> Self {
        self.notary = Some(notary);
        self
    }

    pub fn set_time_window(mut self, time_window: TimeWindow) -> Self {
        self.time_window = Some(time_window);
        self
    }

    pub fn set_time_window_between(
        self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Self, ProposalError> {
        Ok(self.set_time_window(TimeWindow::between(from, until)?))
    }

    pub fn add_input_state(mut self, input: StateAndRef) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn add_output_state(mut self, output: Token) -> Self {
        self.outputs.push(output);
        self
    }

    /// Add a command. Adding an identical command twice keeps one copy.
    pub fn add_command(mut self, command: Command) -> Self {
        self.commands.insert(command);
        self
    }

    /// Check the invariants and produce the proposal
    pub fn build(self) -> Result<TransactionProposal, ProposalError> {
        let notary = self.notary.ok_or(ProposalError::MissingNotary)?;
        let time_window = self.time_window.ok_or(ProposalError::MissingTimeWindow)?;
        let required_signatories = signatories_of(&self.commands);

        let mut proposal = TransactionProposal {
            id: TransactionId::default(),
            notary,
            time_window,
            inputs: self.inputs,
            outputs: self.outputs,
            commands: self.commands,
            required_signatories,
        };
        proposal.id = proposal.recompute_id()?;
        proposal.validate()?;

        debug!(
            "Built proposal {} with {} inputs, {} outputs, {} signatories",
            proposal.id,
            proposal.inputs.len(),
            proposal.outputs.len(),
            proposal.required_signatories.len()
        );

        Ok(proposal)
    }
}

/// Build the proposal that mints `output`.
///
/// One `Create` command signed by every participant of the output, no inputs.
pub fn build_create_proposal(
    notary: Party,
    output: Token,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
) -> Result<TransactionProposal, ProposalError> {
    let command = Command::new(CommandKind::Create, output.participants().iter().cloned());

    TransactionBuilder::new()
        .set_notary(notary)
        .set_time_window_between(valid_from, valid_until)?
        .add_output_state(output)
        .add_command(command)
        .build()
}

/// Build the proposal that transfers the finalized token `input` to `new_owner`.
///
/// The current owner signs the `Move` command.
pub fn build_move_proposal(
    notary: Party,
    input: StateAndRef,
    new_owner: Party,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
) -> Result<TransactionProposal, ProposalError> {
    let output = input.state.with_owner(new_owner);
    let command = Command::new(CommandKind::Move, [input.state.owner().clone()]);

    TransactionBuilder::new()
        .set_notary(notary)
        .set_time_window_between(valid_from, valid_until)?
        .add_input_state(input)
        .add_output_state(output)
        .add_command(command)
        .build()
}
