use crate::{
    db_types::{NewOwner, Owner},
    traits::PaymentGatewayError,
};

/// Owners are the accounts payments are collected for. Partners refer to them by public key.
#[allow(async_fn_in_trait)]
pub trait OwnerManagement {
    async fn insert_owner(&self, owner: NewOwner) -> Result<Owner, PaymentGatewayError>;

    async fn fetch_owner(&self, id: i64) -> Result<Option<Owner>, PaymentGatewayError>;

    async fn fetch_owner_by_public_key(&self, public_key: &str) -> Result<Option<Owner>, PaymentGatewayError>;

    /// Replaces the partner callback and redirect URLs for an owner.
    async fn update_owner_urls(
        &self,
        id: i64,
        callback_url: Option<String>,
        redirect_url: Option<String>,
    ) -> Result<Owner, PaymentGatewayError>;
}
