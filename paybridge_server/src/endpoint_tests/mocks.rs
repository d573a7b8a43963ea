use std::collections::HashMap;

use mockall::mock;
use paybridge_engine::{
    db_types::IntentId,
    processor::{Intent, IntentStatus, PaymentProcessor, ProcessorError},
};
use pbg_common::MinorUnits;

mock! {
    pub Processor {}
    impl PaymentProcessor for Processor {
        async fn create_intent(&self, amount: MinorUnits, currency: &str, metadata: HashMap<String, String>) -> Result<Intent, ProcessorError>;
        async fn get_intent(&self, intent_id: &IntentId) -> Result<Intent, ProcessorError>;
        async fn cancel_intent(&self, intent_id: &IntentId) -> Result<Intent, ProcessorError>;
        async fn update_intent_metadata(&self, intent_id: &IntentId, metadata: HashMap<String, String>) -> Result<Intent, ProcessorError>;
        async fn resolve_wallet_type(&self, intent_id: &IntentId) -> Option<String>;
    }
}

/// An intent as the processor would return it right after creation.
pub fn new_intent(id: &str, amount: MinorUnits, currency: &str, metadata: HashMap<String, String>) -> Intent {
    Intent {
        id: IntentId::new(id),
        status: IntentStatus::RequiresPaymentMethod,
        amount,
        currency: currency.to_lowercase(),
        metadata,
        client_secret: Some(format!("{id}_secret_abc")),
    }
}
