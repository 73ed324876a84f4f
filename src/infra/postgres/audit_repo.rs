use {crate::domain::audit::NewAuditEntry, crate::domain::error::MarketError, sqlx::PgExecutor};

/// Works against the pool or inside a transaction, so state changes and the
/// audit row describing them can commit together.
pub async fn insert_audit_entry<'e, E>(executor: E, entry: &NewAuditEntry) -> Result<(), MarketError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_log
            (id, actor, action, resource_type, resource_id, event_id,
             before_state, after_state, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.actor)
    .bind(&entry.action)
    .bind(&entry.resource_type)
    .bind(entry.resource_id)
    .bind(entry.event_id.as_deref())
    .bind(entry.before.as_ref())
    .bind(entry.after.as_ref())
    .bind(entry.ip_address.as_deref())
    .bind(entry.user_agent.as_deref())
    .execute(executor)
    .await?;

    Ok(())
}
