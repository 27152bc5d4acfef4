use anyhow::Context;
use tracing::{error, info, warn};

use crate::{
    auth::password::hash_password,
    config::{AppConfig, SeedAccount},
    users::{
        repo::UserStore,
        repo_types::{NewUser, Role},
    },
    validation::normalize_email,
};

/// Creates the admin and test accounts unless a user with that name exists.
/// Safe to run on every start. Each account is tried on its own and failures
/// are only logged; returns whether both accounts are in place.
pub async fn seed_default_accounts(store: &dyn UserStore, config: &AppConfig) -> bool {
    let mut ready = true;
    for (account, role) in [(&config.admin, Role::Admin), (&config.test_user, Role::User)] {
        match ensure_account(store, account, role).await {
            Ok(SeedOutcome::Failed) => ready = false,
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, username = %account.username, "seeding failed");
                ready = false;
            }
        }
    }
    ready
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeedOutcome {
    Present,
    Created,
    Failed,
}

async fn ensure_account(
    store: &dyn UserStore,
    account: &SeedAccount,
    role: Role,
) -> anyhow::Result<SeedOutcome> {
    if store.find_by_username(&account.username).await.is_some() {
        info!(username = %account.username, %role, "seed account already present");
        return Ok(SeedOutcome::Present);
    }

    let password_hash = hash_password(&account.password).context("hash seed password")?;
    let Some(user) = store
        .create(NewUser {
            username: account.username.clone(),
            email: normalize_email(&account.email),
            password_hash,
            role,
        })
        .await
    else {
        error!(
            username = %account.username,
            email = %account.email,
            "could not create seed account; is the email taken?"
        );
        return Ok(SeedOutcome::Failed);
    };

    if account.default_password {
        warn!(
            username = %user.username,
            "seed account created with the built-in default password; change it"
        );
    }
    info!(user_id = user.id, username = %user.username, %role, "seed account created");
    Ok(SeedOutcome::Created)
}
