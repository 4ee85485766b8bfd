use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::token::TokenRecord;
use crate::cache::token_cache::{TokenCache, MAIL_CREDS_SLOT};
use crate::exchange::Exchanger;
use crate::observability::metrics::get_metrics;
use crate::refresh::credential::Credential;
use crate::refresh::worker::{RefreshWorker, WorkerOptions, WorkerPlan};
use crate::secrets::{SecretMaterial, SecretSource};

/// Starts and owns every refresh worker.
///
/// Startup is all-or-nothing: every secret is fetched before the first
/// worker is spawned, and any fetch failure aborts the whole start.
pub struct RefreshEngine {
    credentials: Vec<Arc<Credential>>,
    secrets: Arc<dyn SecretSource>,
    exchanger: Arc<dyn Exchanger>,
    cache: TokenCache,
    options: WorkerOptions,
}

/// Handle over the spawned workers
#[derive(Debug)]
pub struct RefreshHandle {
    cache: TokenCache,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    expected_slots: Vec<String>,
}

impl RefreshEngine {
    pub fn new(
        credentials: Vec<Credential>,
        secrets: Arc<dyn SecretSource>,
        exchanger: Arc<dyn Exchanger>,
        cache: TokenCache,
        options: WorkerOptions,
    ) -> Self {
        Self {
            credentials: credentials.into_iter().map(Arc::new).collect(),
            secrets,
            exchanger,
            cache,
            options,
        }
    }

    /// Index of the credential whose secret is published as mail credentials.
    /// Only a two-secret setup has one.
    pub fn mail_creds_index(&self) -> Option<usize> {
        (self.credentials.len() == 2).then_some(1)
    }

    /// One plan per (refreshed credential x stagger offset)
    pub fn plan_workers(&self) -> Vec<WorkerPlan> {
        let mail = self.mail_creds_index();
        self.credentials
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != mail)
            .filter_map(|(_, credential)| {
                credential.token_endpoint.as_ref().map(|endpoint| (credential, endpoint))
            })
            .flat_map(|(credential, endpoint)| {
                credential
                    .stagger_offsets
                    .iter()
                    .enumerate()
                    .map(move |(replica, stagger)| WorkerPlan {
                        credential: Arc::clone(credential),
                        endpoint: endpoint.clone(),
                        replica,
                        stagger: *stagger,
                    })
            })
            .collect()
    }

    /// Slots that hold a value once startup has fully converged
    pub fn expected_slots(&self) -> Vec<String> {
        let mail = self.mail_creds_index();
        let mut slots: Vec<String> = self
            .credentials
            .iter()
            .enumerate()
            .map(|(index, credential)| match Some(index) == mail {
                true => MAIL_CREDS_SLOT.to_owned(),
                false => credential.slot().to_owned(),
            })
            .collect();
        slots.sort();
        slots.dedup();
        slots
    }

    /// Fetch every secret, publish static values, spawn the workers
    pub async fn start(self, cancel: CancellationToken) -> Result<RefreshHandle> {
        if self.credentials.is_empty() {
            return Err(anyhow!("no credentials configured"));
        }

        // 1. secrets, all of them, before anything runs
        let mut materials: Vec<SecretMaterial> = Vec::with_capacity(self.credentials.len());
        for credential in &self.credentials {
            let material = RefreshWorker::fetch_secret(self.secrets.as_ref(), credential)
                .await
                .with_context(|| {
                    format!("error retrieving secret '{}' for credential '{}'", credential.secret_ref, credential.id)
                })?;
            materials.push(material);
        }

        // 2. values used verbatim
        let mail = self.mail_creds_index();
        for (index, (credential, material)) in self.credentials.iter().zip(&materials).enumerate() {
            let slot = if Some(index) == mail {
                MAIL_CREDS_SLOT
            } else if !credential.is_refreshed() {
                credential.slot()
            } else {
                continue;
            };
            self.publish_verbatim(slot, credential, material)?;
        }

        // 3. refresh workers
        let plans = self.plan_workers();
        let metrics = get_metrics().await;
        let mut workers = Vec::with_capacity(plans.len());
        for plan in plans {
            let index = self
                .credentials
                .iter()
                .position(|c| Arc::ptr_eq(c, &plan.credential))
                .ok_or_else(|| anyhow!("plan for unknown credential '{}'", plan.credential.id))?;
            let worker = RefreshWorker::new(
                plan,
                materials[index].clone(),
                Arc::clone(&self.exchanger),
                self.cache.clone(),
                self.options.clone(),
            );
            let cancel = cancel.clone();
            workers.push(tokio::spawn(async move {
                metrics.active_workers.inc();
                worker.run(cancel).await;
                metrics.active_workers.dec();
            }));
        }

        info!(
            credentials = self.credentials.len(),
            workers = workers.len(),
            "refresh engine started"
        );

        Ok(RefreshHandle {
            expected_slots: self.expected_slots(),
            cache: self.cache,
            cancel,
            workers,
        })
    }

    fn publish_verbatim(&self, slot: &str, credential: &Credential, material: &SecretMaterial) -> Result<()> {
        let value = String::from_utf8(material.as_bytes().to_vec())
            .with_context(|| format!("secret for credential '{}' is not valid UTF-8", credential.id))?;
        self.cache.store(
            slot,
            TokenRecord::verbatim(value, credential.token_kind, self.options.clock.now()),
        );
        info!(credential = %credential.id, slot, "secret published verbatim");
        Ok(())
    }
}

impl RefreshHandle {
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn expected_slots(&self) -> &[String] {
        &self.expected_slots
    }

    /// Cancel every worker and wait for them to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Wait for every worker; returns only once they are cancelled
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                if e.is_panic() {
                    warn!("refresh worker panicked");
                }
            }
        }
        info!("all refresh workers stopped");
    }
}
