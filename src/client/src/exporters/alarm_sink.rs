use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::exporters::webhook::WebhookSink;

/// Capability interface for delivering one alarm message. Implementations
/// decide their own transport; the dispatcher's dedup and counting logic
/// never changes when a sink is added.
#[allow(async_fn_in_trait)]
pub trait AlarmSink {
    async fn deliver(&self, message: &str) -> Result<()>;
}

pub enum AlarmSinkEnum {
    Webhook(WebhookSink),
    Memory(MemorySink),
}

impl AlarmSink for AlarmSinkEnum {
    async fn deliver(&self, message: &str) -> Result<()> {
        match self {
            AlarmSinkEnum::Webhook(sink) => sink.deliver(message).await,
            AlarmSinkEnum::Memory(sink) => sink.deliver(message).await,
        }
    }
}

impl AlarmSinkEnum {
    pub fn variant_name(&self) -> &'static str {
        match self {
            AlarmSinkEnum::Webhook(_) => "WebhookSink",
            AlarmSinkEnum::Memory(_) => "MemorySink",
        }
    }
}

/// Records delivered messages in memory. Clones share the same buffer, so a
/// test can keep a handle while the dispatcher owns another. Can be told to
/// fail every delivery to exercise the at-most-once accounting path.
#[derive(Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<String>>>,
    fail_deliveries: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail_deliveries.store(true, Ordering::SeqCst);
        sink
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl AlarmSink for MemorySink {
    async fn deliver(&self, message: &str) -> Result<()> {
        if self.fail_deliveries.load(Ordering::SeqCst) {
            return Err(anyhow!("delivery refused"));
        }
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}
