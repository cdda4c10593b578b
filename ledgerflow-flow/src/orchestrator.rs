use ledgerflow_core::{
    build_create_proposal, sign, Clock, FinalizationOutcome, KeyStore, MemberName, Party,
    SignedTransaction, SigningError, Token, TransactionId,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::FlowConfig;
use crate::error::{ConfigError, ErrorDetail, FlowError, LookupError, UpstreamFailure};
use crate::finality::Finalizer;
use crate::services::{LedgerSubmission, MembershipLookup, NotaryLookup};

/// Request to mint a security token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    /// Security identifier, e.g. a CUSIP
    pub asset_id: String,
    pub quantity: i64,
    pub owner: MemberName,
    pub issuer: MemberName,
}

/// Mints a token: resolve identities, build, sign, finalize.
pub struct MintTokenFlow {
    membership: Arc<dyn MembershipLookup>,
    notaries: Arc<dyn NotaryLookup>,
    keys: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
    finalizer: Finalizer,
    config: FlowConfig,
}

impl MintTokenFlow {
    pub fn new(
        membership: Arc<dyn MembershipLookup>,
        notaries: Arc<dyn NotaryLookup>,
        keys: Arc<dyn KeyStore>,
        submission: Arc<dyn LedgerSubmission>,
        clock: Arc<dyn Clock>,
        config: FlowConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            membership,
            notaries,
            keys,
            clock,
            finalizer: Finalizer::new(submission, config.finality_timeout()),
            config,
        })
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Run the whole flow and return the finalized transaction id as hex
    pub async fn run(&self, request: &MintRequest) -> Result<String, FlowError> {
        let signed = self.prepare(request)?;
        let id = self.finalize(&signed, &[]).await?;
        Ok(id.to_string())
    }

    /// Request/response boundary: JSON request in, transaction id or error payload out
    pub async fn call(&self, request_json: &str) -> Result<String, ErrorDetail> {
        let request: MintRequest = serde_json::from_str(request_json)
            .map_err(|err| ErrorDetail::invalid_request(&err))?;
        self.run(&request).await.map_err(|err| {
            warn!("Mint of {} failed: {}", request.asset_id, err);
            ErrorDetail::from(err)
        })
    }

    /// Build and sign the mint transaction without submitting it.
    ///
    /// Nothing leaves the process, so any error here means nothing happened.
    pub fn prepare(&self, request: &MintRequest) -> Result<SignedTransaction, FlowError> {
        let me = self.membership.my_info().party()?;
        let owner = self.membership.resolve(&request.owner)?.party()?;
        let issuer = self.membership.resolve(&request.issuer)?.party()?;
        let notary = self.pick_notary()?;

        let token = Token::new(
            request.asset_id.clone(),
            request.quantity,
            owner.clone(),
            issuer.clone(),
            vec![owner, issuer],
        )?;

        let valid_from = self.clock.now();
        let valid_until = valid_from + self.config.validity_window();
        let proposal = build_create_proposal(notary, token, valid_from, valid_until)?;
        debug!(
            "Mint proposal {} for {} x{}",
            proposal.id(),
            request.asset_id,
            request.quantity
        );

        let signed = sign(proposal, &me, self.keys.as_ref())?;
        if !signed.is_fully_signed() {
            return Err(SigningError::Incomplete(signed.missing_signatories()).into());
        }
        Ok(signed)
    }

    fn pick_notary(&self) -> Result<Party, LookupError> {
        self.notaries
            .notary_services()
            .first()
            .map(|info| info.party())
            .ok_or(LookupError::NoNotary)
    }

    /// Finalize `signed`, retrying while the notary is unreachable.
    ///
    /// Safe to call again with the same transaction after an
    /// `UpstreamUnavailable` error.
    pub async fn finalize(
        &self,
        signed: &SignedTransaction,
        observers: &[Party],
    ) -> Result<TransactionId, FlowError> {
        let transaction_id = signed.id();
        let max_attempts = self.config.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.finalizer.finalize(signed, observers).await {
                FinalizationOutcome::Finalized { transaction_id } => {
                    info!(
                        "Transaction {} finalized after {} attempt(s)",
                        transaction_id, attempt
                    );
                    return Ok(transaction_id);
                }
                FinalizationOutcome::Rejected { reason } => {
                    return Err(FlowError::Rejected {
                        transaction_id,
                        reason,
                    });
                }
                FinalizationOutcome::Unreachable { cause } => {
                    if attempt >= max_attempts {
                        warn!(
                            "Giving up on {} after {} attempts: {}",
                            transaction_id, attempt, cause
                        );
                        return Err(FlowError::UpstreamUnavailable(
                            UpstreamFailure::Unreachable {
                                cause,
                                transaction_id,
                                attempts: attempt,
                            },
                        ));
                    }

                    let delay = self.config.backoff.delay_for_attempt(attempt);
                    warn!(
                        "Notary unreachable for {} ({}), retry {}/{} in {}ms",
                        transaction_id,
                        cause,
                        attempt + 1,
                        max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// What the notary decided about `id`, if it can be asked
    pub async fn query_outcome(&self, id: &TransactionId) -> Option<FinalizationOutcome> {
        self.finalizer.query_outcome(id).await
    }
}
