//! First-contact user resolution.

use tracing::info;

use super::model::User;
use crate::error::DatabaseError;
use crate::store::Database;

/// Load the user for `phone_number`, creating one on first contact.
///
/// Concurrent first messages from the same number converge on a single
/// row: the insert is conditional and the winner is read back.
pub async fn resolve_user(
    store: &dyn Database,
    phone_number: &str,
    name_hint: Option<&str>,
) -> Result<User, DatabaseError> {
    if let Some(user) = store.get_user_by_phone(phone_number).await? {
        return Ok(user);
    }

    let candidate = User::new(phone_number, name_hint);
    if store.insert_user_if_absent(&candidate).await? {
        info!(user_id = %candidate.id, phone = phone_number, "New user registered");
    }

    store
        .get_user_by_phone(phone_number)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "user".into(),
            id: phone_number.to_string(),
        })
}
