//! KLVM actor runtime
//!
//! An [`ActorSystem`] owns the kernel context, a fixed worker pool and the
//! registry of live actors. Actors are created through the staged
//! [`ActorBuilder`] and reached through [`ActorRefObj`] values.

pub mod actor;
pub mod builder;
pub mod executor;
pub mod message;
pub mod request;

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::{KernelError, KlvmResult, RuntimeError, RuntimeResult};
use crate::kernel::{
    ActorCfg, ActorRefObj, Complete, EnvEntry, Envelope, Kernel, Operand, Spawner, Var,
};
use crate::types::{Address, KlvmConfig};

pub use actor::LocalActor;
pub use builder::{ActorBuilder, ActorBuilderConfigured, ActorBuilderConstructed};
pub use executor::{Executor, ExecutorSnapshot, MAX_ITEMS_PER_TURN};
pub use message::{Mailbox, MailboxItem, Signal};
pub use request::RequestClient;

struct SystemInner {
    kernel: Kernel,
    executor: Executor,
    actors: DashMap<Address, Arc<LocalActor>>,
}

/// Actor system handle; clones share the same system
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

impl ActorSystem {
    pub fn new(kernel: Kernel) -> RuntimeResult<Self> {
        let config = kernel.config();
        let executor = Executor::new(config.worker_threads, &config.system_name)?;
        info!(
            system = %config.system_name,
            workers = config.worker_threads,
            time_slice = config.time_slice,
            "actor system started"
        );
        Ok(ActorSystem {
            inner: Arc::new(SystemInner {
                kernel,
                executor,
                actors: DashMap::new(),
            }),
        })
    }

    pub fn with_config(config: KlvmConfig) -> KlvmResult<Self> {
        Ok(Self::new(Kernel::new(config)?)?)
    }

    pub fn kernel(&self) -> &Kernel {
        &self.inner.kernel
    }

    pub fn builder(&self) -> ActorBuilder<'_> {
        ActorBuilder::new(self)
    }

    /// Register a new actor at `address` and queue its configuration
    pub(crate) fn spawn(&self, address: Address, cfg: Arc<ActorCfg>) -> RuntimeResult<ActorRefObj> {
        let spawner = Arc::new(SystemSpawner {
            system: Arc::downgrade(&self.inner),
        });
        let actor = LocalActor::new(
            address.clone(),
            self.inner.kernel.clone(),
            self.inner.executor.handle(),
            spawner,
        );
        match self.inner.actors.entry(address.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(RuntimeError::AddressInUse(address))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(actor.clone());
            }
        }
        actor.configure(cfg);
        Ok(ActorRefObj::new(actor))
    }

    pub fn actor_ref(&self, address: &Address) -> RuntimeResult<ActorRefObj> {
        self.inner
            .actors
            .get(address)
            .map(|actor| ActorRefObj::new(actor.value().clone()))
            .ok_or_else(|| RuntimeError::ActorNotFound(address.clone()))
    }

    /// Ask with the configured default timeout
    pub fn ask(&self, actor: &ActorRefObj, message: Complete) -> RuntimeResult<Complete> {
        let timeout = Duration::from_millis(self.inner.kernel.config().ask_timeout_ms);
        self.ask_timeout(actor, message, timeout)
    }

    /// Ask and wait at most `timeout` for the response. A failure raised by
    /// the handler arrives as a failed value, not as an error.
    pub fn ask_timeout(
        &self,
        actor: &ActorRefObj,
        message: Complete,
        timeout: Duration,
    ) -> RuntimeResult<Complete> {
        let client = RequestClient::new(actor.clone());
        client.send(message);
        client.await_response(timeout)
    }

    pub fn tell(&self, actor: &ActorRefObj, message: Complete) {
        actor.send(Envelope::Notify { message });
    }

    /// Deregister the actor and stop it once its queued items are handled
    pub fn stop(&self, address: &Address) -> RuntimeResult<()> {
        let (_, actor) = self
            .inner
            .actors
            .remove(address)
            .ok_or_else(|| RuntimeError::ActorNotFound(address.clone()))?;
        actor.stop();
        debug!(address = %address, "stop requested");
        Ok(())
    }

    pub fn actor_count(&self) -> usize {
        self.inner.actors.len()
    }

    pub fn stats(&self) -> ExecutorSnapshot {
        self.inner.executor.stats()
    }

    /// Stop every actor and join the workers
    pub fn shutdown(&self) {
        let actors: Vec<Arc<LocalActor>> = self
            .inner
            .actors
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.inner.actors.clear();
        for actor in &actors {
            actor.terminate();
        }
        self.inner.executor.shutdown();
        info!(actors = actors.len(), "actor system shut down");
    }
}

/// Spawns children of running actors; does not keep the system alive
struct SystemSpawner {
    system: Weak<SystemInner>,
}

impl Spawner for SystemSpawner {
    fn spawn(&self, parent: &Address, cfg: Arc<ActorCfg>) -> Result<ActorRefObj, KernelError> {
        let inner = self
            .system
            .upgrade()
            .ok_or_else(|| KernelError::InvalidArgument("actor system is shut down".to_string()))?;
        ActorSystem { inner }
            .spawn(Address::generate(parent.as_str()), cfg)
            .map_err(|e| KernelError::InvalidArgument(e.to_string()))
    }
}

/// Environment entries `$a0..` bound to `args`, with matching operands
pub(crate) fn arg_bindings(args: &[Complete]) -> (Vec<EnvEntry>, Vec<Operand>) {
    args.iter()
        .enumerate()
        .map(|(index, arg)| {
            let ident = format!("$a{}", index);
            let entry = EnvEntry::new(ident.as_str(), Var::bound(arg.value().clone()));
            (entry, Operand::ident(&ident))
        })
        .unzip()
}
