//! Subscription rows mirrored from the payment provider.
//!
//! `status` is stored verbatim; [`SubscriptionStatus`](crate::SubscriptionStatus)
//! is the typed view the engine works with.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub customer_id: String,
    pub subscription_id: Option<String>,
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
    pub payment_method_brand: Option<String>,
    pub payment_method_last4: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::billing_customers::Entity",
        from = "Column::CustomerId",
        to = "super::billing_customers::Column::CustomerId",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    BillingCustomers,
}

impl Related<super::billing_customers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BillingCustomers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
