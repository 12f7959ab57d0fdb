//! Registration, login, and profile maintenance.
//!
//! Authentication policy lives in the backend service; this module owns
//! only what the front-end does: local-first validation (a failing form
//! makes zero remote calls) and the profile record under `users/{uid}`.

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use devchat_backend::BackendHandle;
use devchat_shared::paths;
use devchat_shared::types::{UserId, UserProfile, UserRef};
use devchat_shared::validation::{LoginForm, RegistrationForm};

use crate::state::Session;
use crate::{ClientError, Result};

/// Validate a registration form and create the user's profile record.
///
/// The uid stands in for whatever the auth service would assign; the
/// profile write under `users/{uid}` is what makes the user visible to
/// everyone's direct-message panel.
pub async fn register_user(
    backend: &BackendHandle,
    form: &RegistrationForm,
) -> Result<UserRef> {
    form.validate()?;

    let uid = UserId::new(format!("u-{}", Uuid::new_v4()));
    let profile = UserProfile {
        name: form.username.clone(),
        avatar: default_avatar(&uid),
    };
    backend
        .write(paths::user_profile(&uid), json!(&profile))
        .await?;

    info!(uid = %uid, name = %profile.name, "User registered");
    Ok(UserRef {
        id: uid,
        name: profile.name,
        avatar: profile.avatar,
    })
}

/// Validate a login form and load the profile the auth service resolved
/// it to. Credential checking is the auth service's concern; an invalid
/// form never reaches it.
pub async fn sign_in(
    backend: &BackendHandle,
    form: &LoginForm,
    uid: &UserId,
) -> Result<UserRef> {
    form.validate()?;

    let stored = backend
        .read_once(paths::user_profile(uid))
        .await?
        .ok_or_else(|| ClientError::UnknownUser(uid.clone()))?;
    let profile: UserProfile = serde_json::from_value(stored)?;

    info!(uid = %uid, name = %profile.name, "User signed in");
    Ok(UserRef {
        id: uid.clone(),
        name: profile.name,
        avatar: profile.avatar,
    })
}

/// Sign out: drop the presence marker and clear the session.
pub async fn sign_out(
    backend: &BackendHandle,
    session: &mut Session,
    uid: &UserId,
) -> Result<()> {
    backend.remove(paths::presence_entry(uid)).await?;
    session.clear_user();
    info!(uid = %uid, "Signed out");
    Ok(())
}

/// Point the user's profile at a freshly uploaded avatar URL.
///
/// Writes only the `avatar` leaf: the profile subtree also holds the
/// starred-channel snapshots, which must survive the update.
pub async fn change_avatar(backend: &BackendHandle, uid: &UserId, url: &str) -> Result<()> {
    backend
        .write(paths::user_profile(uid).child("avatar"), json!(url))
        .await?;
    info!(uid = %uid, "Avatar updated");
    Ok(())
}

fn default_avatar(uid: &UserId) -> String {
    format!("https://avatars.devchat.app/{uid}.png")
}

#[cfg(test)]
mod tests {
    use super::*;
    use devchat_backend::{spawn_backend, BackendConfig};

    fn valid_form() -> RegistrationForm {
        RegistrationForm {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "hunter22".to_string(),
            password_confirmation: "hunter22".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_writes_profile() {
        let (backend, _events) = spawn_backend(BackendConfig::default());

        let user = register_user(&backend, &valid_form()).await.unwrap();
        assert_eq!(user.name, "alice");

        let stored = backend
            .read_once(paths::user_profile(&user.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["name"], "alice");
    }

    #[tokio::test]
    async fn test_short_password_makes_no_remote_calls() {
        let (backend, _events) = spawn_backend(BackendConfig::default());

        let mut form = valid_form();
        form.password = "1234".to_string();
        form.password_confirmation = "1234".to_string();

        let err = register_user(&backend, &form).await.unwrap_err();
        assert_eq!(err.to_string(), "Password is invalid");

        // No profile was created for anyone.
        assert!(backend.read_once(paths::users()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_in_loads_stored_profile() {
        let (backend, _events) = spawn_backend(BackendConfig::default());
        let user = register_user(&backend, &valid_form()).await.unwrap();

        let form = LoginForm {
            email: "alice@example.com".to_string(),
            password: "hunter22".to_string(),
        };
        let signed_in = sign_in(&backend, &form, &user.id).await.unwrap();
        assert_eq!(signed_in, user);
    }

    #[tokio::test]
    async fn test_sign_in_empty_form_rejected() {
        let (backend, _events) = spawn_backend(BackendConfig::default());
        let user = register_user(&backend, &valid_form()).await.unwrap();

        let err = sign_in(&backend, &LoginForm::default(), &user.id)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Fill in all fields");
    }

    #[tokio::test]
    async fn test_sign_in_unknown_uid_fails() {
        let (backend, _events) = spawn_backend(BackendConfig::default());

        let form = LoginForm {
            email: "ghost@example.com".to_string(),
            password: "hunter22".to_string(),
        };
        let err = sign_in(&backend, &form, &UserId::new("u-ghost"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("u-ghost"));
    }

    #[tokio::test]
    async fn test_sign_out_removes_presence() {
        let (backend, _events) = spawn_backend(BackendConfig::default());
        let user = register_user(&backend, &valid_form()).await.unwrap();

        backend
            .write(paths::presence_entry(&user.id), json!(true))
            .await
            .unwrap();

        let mut session = Session::new();
        session.set_user(user.clone());
        sign_out(&backend, &mut session, &user.id).await.unwrap();

        assert!(session.current_user.is_none());
        assert!(backend
            .read_once(paths::presence_entry(&user.id))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_change_avatar_keeps_name() {
        let (backend, _events) = spawn_backend(BackendConfig::default());
        let user = register_user(&backend, &valid_form()).await.unwrap();

        change_avatar(&backend, &user.id, "devchat-storage:///avatars/u1")
            .await
            .unwrap();

        let stored = backend
            .read_once(paths::user_profile(&user.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["name"], "alice");
        assert_eq!(stored["avatar"], "devchat-storage:///avatars/u1");
    }
}
