use sea_orm::DbBackend;
use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_users_table::Migration),
            Box::new(m20240601_000002_create_work_orders_table::Migration),
            Box::new(m20240601_000003_create_payments_table::Migration),
            Box::new(m20240601_000004_create_ledger_tables::Migration),
            Box::new(m20240601_000005_create_system_settings_table::Migration),
        ]
    }
}

/// Money columns: exact decimal on Postgres, REAL on SQLite where the driver
/// round-trips `Decimal` through `f64`.
fn money(backend: DbBackend, col: &mut ColumnDef) -> &mut ColumnDef {
    match backend {
        DbBackend::Sqlite => col.double(),
        _ => col.decimal_len(14, 2),
    }
}

fn rate(backend: DbBackend, col: &mut ColumnDef) -> &mut ColumnDef {
    match backend {
        DbBackend::Sqlite => col.double(),
        _ => col.decimal_len(7, 4),
    }
}

mod m20240601_000001_create_users_table {
    use super::rate;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Role).string_len(16).not_null())
                        .col(ColumnDef::new(Users::EmploymentType).string_len(16).null())
                        .col(
                            ColumnDef::new(Users::IsBlocked)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Users::Presence)
                                .string_len(16)
                                .not_null()
                                .default("OFFLINE"),
                        )
                        .col(
                            ColumnDef::new(Users::UseCustomRate)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(rate(backend, &mut ColumnDef::new(Users::CustomRate)).null())
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_role")
                        .table(Users::Table)
                        .col(Users::Role)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Name,
        Role,
        EmploymentType,
        IsBlocked,
        Presence,
        UseCustomRate,
        CustomRate,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_work_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_work_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WorkOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WorkOrders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::Number)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(WorkOrders::Title).string().not_null())
                        .col(ColumnDef::new(WorkOrders::Description).text().null())
                        .col(ColumnDef::new(WorkOrders::Address).string().null())
                        .col(ColumnDef::new(WorkOrders::Status).string_len(32).not_null())
                        .col(ColumnDef::new(WorkOrders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(WorkOrders::TechnicianId).uuid().null())
                        .col(ColumnDef::new(WorkOrders::DispatcherId).uuid().null())
                        .col(ColumnDef::new(WorkOrders::ServiceRequestId).uuid().null())
                        .col(
                            ColumnDef::new(WorkOrders::ScheduledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::AssignedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::ResponseDeadlineAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::AcceptedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::StartedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::PaidVerifiedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(WorkOrders::CancelReason).text().null())
                        .col(ColumnDef::new(WorkOrders::CompletionNotes).text().null())
                        .col(ColumnDef::new(WorkOrders::Materials).json().null())
                        .col(
                            ColumnDef::new(WorkOrders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_status")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_technician_id")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::TechnicianId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_work_orders_response_deadline_at")
                        .table(WorkOrders::Table)
                        .col(WorkOrders::ResponseDeadlineAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WorkOrderCheckIns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WorkOrderCheckIns::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrderCheckIns::WorkOrderId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrderCheckIns::TechnicianId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrderCheckIns::Latitude)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrderCheckIns::Longitude)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WorkOrderCheckIns::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_check_ins_work_order")
                                .from(WorkOrderCheckIns::Table, WorkOrderCheckIns::WorkOrderId)
                                .to(WorkOrders::Table, WorkOrders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AuditLogs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(AuditLogs::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(AuditLogs::EntityType).string_len(64).not_null())
                        .col(ColumnDef::new(AuditLogs::EntityId).string_len(64).not_null())
                        .col(ColumnDef::new(AuditLogs::Action).string_len(64).not_null())
                        .col(ColumnDef::new(AuditLogs::ActorId).uuid().null())
                        .col(ColumnDef::new(AuditLogs::Details).json().not_null())
                        .col(
                            ColumnDef::new(AuditLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_audit_logs_entity")
                        .table(AuditLogs::Table)
                        .col(AuditLogs::EntityType)
                        .col(AuditLogs::EntityId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AuditLogs::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(WorkOrderCheckIns::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(WorkOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WorkOrders {
        Table,
        Id,
        Number,
        Title,
        Description,
        Address,
        Status,
        CustomerId,
        TechnicianId,
        DispatcherId,
        ServiceRequestId,
        ScheduledAt,
        AssignedAt,
        ResponseDeadlineAt,
        AcceptedAt,
        StartedAt,
        CompletedAt,
        PaidVerifiedAt,
        CancelledAt,
        CancelReason,
        CompletionNotes,
        Materials,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum WorkOrderCheckIns {
        Table,
        Id,
        WorkOrderId,
        TechnicianId,
        Latitude,
        Longitude,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum AuditLogs {
        Table,
        Id,
        EntityType,
        EntityId,
        Action,
        ActorId,
        Details,
        CreatedAt,
    }
}

mod m20240601_000003_create_payments_table {
    use super::money;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::WorkOrderId).integer().not_null())
                        .col(ColumnDef::new(Payments::TechnicianId).uuid().not_null())
                        .col(money(backend, &mut ColumnDef::new(Payments::Amount)).not_null())
                        .col(ColumnDef::new(Payments::Method).string_len(32).not_null())
                        .col(ColumnDef::new(Payments::Reference).string().null())
                        .col(ColumnDef::new(Payments::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Payments::ReviewedBy).uuid().null())
                        .col(
                            ColumnDef::new(Payments::ReviewedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Payments::RejectionReason).text().null())
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_work_order_id")
                        .table(Payments::Table)
                        .col(Payments::WorkOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        WorkOrderId,
        TechnicianId,
        Amount,
        Method,
        Reference,
        Status,
        ReviewedBy,
        ReviewedAt,
        RejectionReason,
        CreatedAt,
    }
}

mod m20240601_000004_create_ledger_tables {
    use super::{money, rate};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_ledger_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let backend = manager.get_database_backend();

            manager
                .create_table(
                    Table::create()
                        .table(Wallets::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Wallets::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Wallets::TechnicianId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            money(backend, &mut ColumnDef::new(Wallets::Balance))
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Wallets::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Wallets::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Wallets::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WalletTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WalletTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WalletTransactions::WalletId).uuid().not_null())
                        .col(
                            ColumnDef::new(WalletTransactions::TechnicianId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WalletTransactions::TxType)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WalletTransactions::SourceType)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(WalletTransactions::SourceId).uuid().null())
                        .col(
                            money(backend, &mut ColumnDef::new(WalletTransactions::Amount))
                                .not_null(),
                        )
                        .col(
                            money(
                                backend,
                                &mut ColumnDef::new(WalletTransactions::BalanceAfter),
                            )
                            .not_null(),
                        )
                        .col(
                            ColumnDef::new(WalletTransactions::Sequence)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WalletTransactions::Description)
                                .text()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WalletTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_wallet_transactions_wallet")
                                .from(WalletTransactions::Table, WalletTransactions::WalletId)
                                .to(Wallets::Table, Wallets::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_wallet_transactions_technician_id")
                        .table(WalletTransactions::Table)
                        .col(WalletTransactions::TechnicianId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_wallet_transactions_wallet_sequence")
                        .table(WalletTransactions::Table)
                        .col(WalletTransactions::WalletId)
                        .col(WalletTransactions::Sequence)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Payouts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payouts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payouts::TechnicianId).uuid().not_null())
                        .col(money(backend, &mut ColumnDef::new(Payouts::TotalAmount)).not_null())
                        .col(ColumnDef::new(Payouts::PayoutType).string_len(16).not_null())
                        .col(ColumnDef::new(Payouts::Status).string_len(16).not_null())
                        .col(ColumnDef::new(Payouts::PaymentReference).string().null())
                        .col(ColumnDef::new(Payouts::ProcessedBy).uuid().null())
                        .col(
                            ColumnDef::new(Payouts::ProcessedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Payouts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Commissions::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Commissions::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Commissions::WorkOrderId).integer().not_null())
                        .col(ColumnDef::new(Commissions::TechnicianId).uuid().not_null())
                        .col(ColumnDef::new(Commissions::PaymentId).uuid().not_null())
                        .col(ColumnDef::new(Commissions::Kind).string_len(16).not_null())
                        .col(rate(backend, &mut ColumnDef::new(Commissions::Rate)).not_null())
                        .col(
                            money(backend, &mut ColumnDef::new(Commissions::BaseAmount))
                                .not_null(),
                        )
                        .col(money(backend, &mut ColumnDef::new(Commissions::Amount)).not_null())
                        .col(ColumnDef::new(Commissions::Status).string_len(16).not_null())
                        .col(ColumnDef::new(Commissions::PayoutId).uuid().null())
                        .col(
                            ColumnDef::new(Commissions::EarnedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Commissions::PaidAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Commissions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One commission per work order; concurrent verifications collide here.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_commissions_work_order_id")
                        .table(Commissions::Table)
                        .col(Commissions::WorkOrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_commissions_technician_status")
                        .table(Commissions::Table)
                        .col(Commissions::TechnicianId)
                        .col(Commissions::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PayoutRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PayoutRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PayoutRequests::TechnicianId).uuid().not_null())
                        .col(
                            money(backend, &mut ColumnDef::new(PayoutRequests::Amount))
                                .not_null(),
                        )
                        .col(ColumnDef::new(PayoutRequests::Status).string_len(16).not_null())
                        .col(ColumnDef::new(PayoutRequests::Reason).text().null())
                        .col(
                            ColumnDef::new(PayoutRequests::PaymentMethod)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(PayoutRequests::ReviewerId).uuid().null())
                        .col(ColumnDef::new(PayoutRequests::ReviewNote).text().null())
                        .col(ColumnDef::new(PayoutRequests::PayoutId).uuid().null())
                        .col(
                            ColumnDef::new(PayoutRequests::RequestedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PayoutRequests::ReviewedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PayoutRequests::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Commissions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Payouts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(WalletTransactions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Wallets::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Wallets {
        Table,
        Id,
        TechnicianId,
        Balance,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum WalletTransactions {
        Table,
        Id,
        WalletId,
        TechnicianId,
        TxType,
        SourceType,
        SourceId,
        Amount,
        BalanceAfter,
        Sequence,
        Description,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Payouts {
        Table,
        Id,
        TechnicianId,
        TotalAmount,
        PayoutType,
        Status,
        PaymentReference,
        ProcessedBy,
        ProcessedAt,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Commissions {
        Table,
        Id,
        WorkOrderId,
        TechnicianId,
        PaymentId,
        Kind,
        Rate,
        BaseAmount,
        Amount,
        Status,
        PayoutId,
        EarnedAt,
        PaidAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PayoutRequests {
        Table,
        Id,
        TechnicianId,
        Amount,
        Status,
        Reason,
        PaymentMethod,
        ReviewerId,
        ReviewNote,
        PayoutId,
        RequestedAt,
        ReviewedAt,
    }
}

mod m20240601_000005_create_system_settings_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_system_settings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SystemSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SystemSettings::Key)
                                .string_len(128)
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SystemSettings::Value).text().not_null())
                        .col(
                            ColumnDef::new(SystemSettings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SystemSettings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SystemSettings {
        Table,
        Key,
        Value,
        UpdatedAt,
    }
}
