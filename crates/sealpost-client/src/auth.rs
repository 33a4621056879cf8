//! Registration and login.
//!
//! An [`AuthSession`] is the lifetime of one login. It owns the user's
//! [`Keyring`]; ending the session (explicit `logout` or drop) clears the
//! keyring, so every monitor still holding it fails with
//! `ClientError::LoggedOut` from then on.

use std::sync::Arc;

use sealpost_core::{ChatStore, EnvRng, Environment, StoreError, UserId, UserIdentity};
use sealpost_crypto::{
    IdentityBundle, generate_identity, reject_unknown_identity, unwrap_identity,
};
use zeroize::Zeroizing;

use crate::{error::ClientError, keyring::Keyring, offload};

/// One logged-in user.
pub struct AuthSession {
    user: UserId,
    keyring: Arc<Keyring>,
}

impl AuthSession {
    /// Create and persist a new identity, then log in with it.
    ///
    /// # Errors
    ///
    /// - `ClientError::AlreadyRegistered` if the user has an identity, also
    ///   when a concurrent registration for the same user lands first
    /// - `ClientError::Network` if the store is unreachable
    pub async fn register<S, E>(
        store: &S,
        env: &E,
        user: UserId,
        password: &str,
    ) -> Result<Self, ClientError>
    where
        S: ChatStore + ?Sized,
        E: Environment,
    {
        if store.load_identity(user).await?.is_some() {
            return Err(ClientError::AlreadyRegistered { user });
        }

        let password = Zeroizing::new(password.to_string());
        let mut rng = EnvRng::new(env.clone());
        let (bundle, key) = offload(move || generate_identity(&password, &mut rng)).await?;

        let identity = UserIdentity {
            user_id: user,
            public_key: bundle.public_key,
            encrypted_private_key: bundle.encrypted_private_key,
            iv: bundle.iv,
            salt: bundle.salt,
        };
        match store.insert_identity(&identity).await {
            Ok(()) => {},
            Err(StoreError::Exists { .. }) => {
                tracing::debug!(user = %user, "concurrent registration won");
                return Err(ClientError::AlreadyRegistered { user });
            },
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user = %user, "identity registered");
        Ok(Self { user, keyring: Arc::new(Keyring::unlocked(key)) })
    }

    /// Unlock an existing identity.
    ///
    /// # Errors
    ///
    /// - `ClientError::LoginFailed` for an unknown user, a wrong password or
    ///   a damaged identity record, without saying which. An unknown user
    ///   still pays for the password derivation.
    /// - `ClientError::Network` if the store is unreachable
    pub async fn login<S>(store: &S, user: UserId, password: &str) -> Result<Self, ClientError>
    where
        S: ChatStore + ?Sized,
    {
        let password = Zeroizing::new(password.to_string());
        let Some(identity) = store.load_identity(user).await? else {
            tracing::debug!(user = %user, "login for unknown user");
            let _ = offload(move || Err::<(), _>(reject_unknown_identity(&password))).await;
            return Err(ClientError::LoginFailed);
        };

        let bundle = IdentityBundle {
            public_key: identity.public_key,
            encrypted_private_key: identity.encrypted_private_key,
            iv: identity.iv,
            salt: identity.salt,
        };

        match offload(move || unwrap_identity(&password, &bundle)).await {
            Ok(key) => {
                tracing::info!(user = %user, "logged in");
                Ok(Self { user, keyring: Arc::new(Keyring::unlocked(key)) })
            },
            Err(ClientError::Crypto(_) | ClientError::Aead) => {
                tracing::debug!(user = %user, "identity unwrap failed");
                Err(ClientError::LoginFailed)
            },
            Err(other) => Err(other),
        }
    }

    /// Logged-in user.
    pub fn user(&self) -> UserId {
        self.user
    }

    /// The session's keyring, for monitors and watchers.
    pub fn keyring(&self) -> Arc<Keyring> {
        Arc::clone(&self.keyring)
    }

    /// End the session and clear all key material.
    pub fn logout(self) {
        tracing::info!(user = %self.user, "logged out");
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        self.keyring.clear();
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("user", &self.user)
            .field("keyring", &self.keyring)
            .finish()
    }
}
