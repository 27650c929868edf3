//! Billing tables mirrored from the payment provider.

use sea_orm_migration::prelude::*;

use crate::m20251230_000000_init::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum BillingCustomers {
    Table,
    UserId,
    CustomerId,
}

#[derive(Iden)]
enum Subscriptions {
    Table,
    CustomerId,
    SubscriptionId,
    Status,
    PriceId,
    CurrentPeriodStart,
    CurrentPeriodEnd,
    CancelAtPeriodEnd,
    PaymentMethodBrand,
    PaymentMethodLast4,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BillingCustomers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BillingCustomers::UserId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BillingCustomers::CustomerId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-billing_customers-user_id")
                            .from(BillingCustomers::Table, BillingCustomers::UserId)
                            .to(Users::Table, Users::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Subscriptions::CustomerId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Subscriptions::SubscriptionId).string())
                    .col(
                        ColumnDef::new(Subscriptions::Status)
                            .string()
                            .not_null()
                            .default("not_started"),
                    )
                    .col(ColumnDef::new(Subscriptions::PriceId).string())
                    .col(ColumnDef::new(Subscriptions::CurrentPeriodStart).big_integer())
                    .col(ColumnDef::new(Subscriptions::CurrentPeriodEnd).big_integer())
                    .col(
                        ColumnDef::new(Subscriptions::CancelAtPeriodEnd)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Subscriptions::PaymentMethodBrand).string())
                    .col(ColumnDef::new(Subscriptions::PaymentMethodLast4).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-subscriptions-customer_id")
                            .from(Subscriptions::Table, Subscriptions::CustomerId)
                            .to(BillingCustomers::Table, BillingCustomers::CustomerId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BillingCustomers::Table).to_owned())
            .await?;
        Ok(())
    }
}
