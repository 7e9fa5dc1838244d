//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::ffi::OsString;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::gateway::{
    ActionHandle, CreatedInstance, Gateway, GatewayError, GatewayFuture, InstanceRequest,
    InstanceSnapshot, PowerAction,
};

/// Server identifier handed out by the first Create against a fresh gateway.
pub const FIRST_SERVER_ID: i64 = 42;
/// Key identifier handed out by the first upload against a fresh gateway.
pub const FIRST_KEY_ID: i64 = 7;
/// Address reported once a scripted server becomes addressable.
pub const SCRIPTED_ADDRESS: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 5);

/// Gateway verbs a test can make fail.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Operation {
    /// [`Gateway::upload_key`].
    UploadKey,
    /// [`Gateway::create_instance`].
    CreateInstance,
    /// [`Gateway::await_action`].
    AwaitAction,
    /// [`Gateway::get_instance`].
    GetInstance,
    /// [`Gateway::delete_instance`].
    DeleteInstance,
    /// [`Gateway::delete_key`].
    DeleteKey,
    /// [`Gateway::power`].
    Power,
}

/// Records a single call made through [`ScriptedGateway`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GatewayCall {
    /// Key registration with its name and public key.
    UploadKey {
        /// Registered key name.
        name: String,
        /// Uploaded public key line.
        public_key: String,
    },
    /// Server creation with the request and attached key.
    CreateInstance {
        /// Requested server parameters.
        request: InstanceRequest,
        /// Attached key identifier.
        ssh_key_id: i64,
    },
    /// Action wait.
    AwaitAction(i64),
    /// Server read.
    GetInstance(i64),
    /// Server deletion.
    DeleteInstance(i64),
    /// Key deletion.
    DeleteKey(i64),
    /// Power operation.
    Power(i64, PowerAction),
}

impl GatewayCall {
    /// Returns the verb this call used.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::UploadKey { .. } => Operation::UploadKey,
            Self::CreateInstance { .. } => Operation::CreateInstance,
            Self::AwaitAction(_) => Operation::AwaitAction,
            Self::GetInstance(_) => Operation::GetInstance,
            Self::DeleteInstance(_) => Operation::DeleteInstance,
            Self::DeleteKey(_) => Operation::DeleteKey,
            Self::Power(..) => Operation::Power,
        }
    }
}

#[derive(Debug)]
struct GatewayState {
    next_server_id: i64,
    next_key_id: i64,
    next_action_id: i64,
    servers: BTreeSet<i64>,
    keys: BTreeSet<i64>,
    status: String,
    address: Ipv4Addr,
    empty_polls: u32,
    failures: BTreeMap<Operation, GatewayError>,
    calls: Vec<GatewayCall>,
}

impl Default for GatewayState {
    fn default() -> Self {
        Self {
            next_server_id: FIRST_SERVER_ID,
            next_key_id: FIRST_KEY_ID,
            next_action_id: 900,
            servers: BTreeSet::new(),
            keys: BTreeSet::new(),
            status: String::from("running"),
            address: SCRIPTED_ADDRESS,
            empty_polls: 0,
            failures: BTreeMap::new(),
            calls: Vec::new(),
        }
    }
}

impl GatewayState {
    fn next_action(&mut self) -> ActionHandle {
        let id = self.next_action_id;
        self.next_action_id += 1;
        ActionHandle { id }
    }

    fn scripted_failure(&self, operation: Operation) -> Result<(), GatewayError> {
        self.failures.get(&operation).cloned().map_or(Ok(()), Err)
    }
}

/// In-memory provider that hands out sequential identifiers and records
/// every call.
///
/// Clones share state, so a test can keep one handle for assertions while a
/// driver owns another.
#[derive(Clone, Debug, Default)]
pub struct ScriptedGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl ScriptedGateway {
    /// Creates a gateway whose servers report an address on the first poll.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `polls` address reads return no address.
    pub fn set_empty_polls(&self, polls: u32) {
        self.lock().empty_polls = polls;
    }

    /// Sets the provider status reported for every server.
    pub fn set_status(&self, status: &str) {
        status.clone_into(&mut self.lock().status);
    }

    /// Makes every call of `operation` fail with `error`.
    pub fn fail(&self, operation: Operation, error: GatewayError) {
        self.lock().failures.insert(operation, error);
    }

    /// Clears a failure registered with [`ScriptedGateway::fail`].
    pub fn succeed(&self, operation: Operation) {
        self.lock().failures.remove(&operation);
    }

    /// Drops every server and key as if deleted out of band.
    pub fn forget_remote_resources(&self) {
        let mut state = self.lock();
        state.servers.clear();
        state.keys.clear();
    }

    /// Returns the servers that currently exist.
    #[must_use]
    pub fn servers(&self) -> BTreeSet<i64> {
        self.lock().servers.clone()
    }

    /// Returns the keys that are currently registered.
    #[must_use]
    pub fn keys(&self) -> BTreeSet<i64> {
        self.lock().keys.clone()
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    /// Counts the recorded calls of one verb.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    fn record<T>(
        &self,
        call: GatewayCall,
        respond: impl FnOnce(&mut GatewayState) -> Result<T, GatewayError>,
    ) -> Result<T, GatewayError> {
        let mut state = self.lock();
        let operation = call.operation();
        state.calls.push(call);
        state.scripted_failure(operation)?;
        respond(&mut *state)
    }
}

fn not_found(kind: &str, id: i64) -> GatewayError {
    GatewayError::NotFound {
        message: format!("{kind} with ID '{id}' not found"),
    }
}

impl Gateway for ScriptedGateway {
    fn upload_key<'a>(&'a self, name: &'a str, public_key: &'a str) -> GatewayFuture<'a, i64> {
        let call = GatewayCall::UploadKey {
            name: name.to_owned(),
            public_key: public_key.to_owned(),
        };
        let result = self.record(call, |state| {
            let id = state.next_key_id;
            state.next_key_id += 1;
            state.keys.insert(id);
            Ok(id)
        });
        Box::pin(async move { result })
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
        ssh_key_id: i64,
    ) -> GatewayFuture<'a, CreatedInstance> {
        let call = GatewayCall::CreateInstance {
            request: request.clone(),
            ssh_key_id,
        };
        let result = self.record(call, |state| {
            let id = state.next_server_id;
            state.next_server_id += 1;
            state.servers.insert(id);
            Ok(CreatedInstance {
                id,
                action: Some(state.next_action()),
            })
        });
        Box::pin(async move { result })
    }

    fn await_action(&self, action: ActionHandle) -> GatewayFuture<'_, ()> {
        let result = self.record(GatewayCall::AwaitAction(action.id), |_| Ok(()));
        Box::pin(async move { result })
    }

    fn get_instance(&self, id: i64) -> GatewayFuture<'_, InstanceSnapshot> {
        let result = self.record(GatewayCall::GetInstance(id), |state| {
            if !state.servers.contains(&id) {
                return Err(not_found("server", id));
            }
            let public_ipv4 = if state.empty_polls > 0 {
                state.empty_polls -= 1;
                None
            } else {
                Some(state.address)
            };
            Ok(InstanceSnapshot {
                id,
                status: state.status.clone(),
                public_ipv4,
            })
        });
        Box::pin(async move { result })
    }

    fn delete_instance(&self, id: i64) -> GatewayFuture<'_, Option<ActionHandle>> {
        let result = self.record(GatewayCall::DeleteInstance(id), |state| {
            if state.servers.remove(&id) {
                Ok(Some(state.next_action()))
            } else {
                Err(not_found("server", id))
            }
        });
        Box::pin(async move { result })
    }

    fn delete_key(&self, id: i64) -> GatewayFuture<'_, ()> {
        let result = self.record(GatewayCall::DeleteKey(id), |state| {
            if state.keys.remove(&id) {
                Ok(())
            } else {
                Err(not_found("ssh_key", id))
            }
        });
        Box::pin(async move { result })
    }

    fn power(&self, id: i64, action: PowerAction) -> GatewayFuture<'_, ActionHandle> {
        let result = self.record(GatewayCall::Power(id, action), |state| {
            if state.servers.contains(&id) {
                Ok(state.next_action())
            } else {
                Err(not_found("server", id))
            }
        });
        Box::pin(async move { result })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
