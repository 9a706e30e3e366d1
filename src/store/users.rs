use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{User, UserProfile};

use super::write_json_atomic;

/// `users.json`: every account that ever logged in, keyed by login name.
pub struct UserStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl UserStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("users.json"),
            write_lock: Mutex::new(()),
        }
    }

    /// Inserts or refreshes the record for `login`. Existing users keep their id.
    pub async fn upsert(&self, login: &str, profile: UserProfile) -> Result<User> {
        let _guard = self.write_lock.lock().await;

        let mut users = self.load().await?;
        let user = match users.iter_mut().find(|u| u.login == login) {
            Some(existing) => {
                existing.apply_profile(profile);
                existing.clone()
            }
            None => {
                let next_id = users.iter().map(|u| u.internal_id).max().unwrap_or(0) + 1;
                let mut user = User {
                    internal_id: next_id,
                    login: login.to_string(),
                    first_name: String::new(),
                    last_name: String::new(),
                    email: String::new(),
                    school_class: String::new(),
                    webdav_url: String::new(),
                };
                user.apply_profile(profile);
                users.push(user.clone());
                user
            }
        };

        write_json_atomic(&self.path, &users).await?;
        tracing::info!(user_id = user.internal_id, login, "Saved user record");
        Ok(user)
    }

    pub async fn find(&self, login: &str) -> Result<Option<User>> {
        Ok(self.load().await?.into_iter().find(|u| u.login == login))
    }

    pub async fn all(&self) -> Result<Vec<User>> {
        self.load().await
    }

    async fn load(&self) -> Result<Vec<User>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn profile(email: &str) -> UserProfile {
        UserProfile {
            first_name: "Anna Maria".to_string(),
            last_name: "Schmidt".to_string(),
            email: email.to_string(),
            school_class: "Q1".to_string(),
            webdav_url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_first_user_gets_id_one() {
        let dir = TempDir::new().unwrap();
        let store = UserStore::new(dir.path());

        let user = store.upsert("aschmidt", profile("a@x.de")).await.unwrap();
        assert_eq!(user.internal_id, 1);
        assert_eq!(store.find("aschmidt").await.unwrap(), Some(user));
        assert_eq!(store.find("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_relogin_keeps_id_and_overwrites_fields() {
        let dir = TempDir::new().unwrap();
        let existing = vec![
            User {
                internal_id: 7,
                login: "aschmidt".to_string(),
                first_name: "Anna".to_string(),
                last_name: "Schmidt".to_string(),
                email: "alt@x.de".to_string(),
                school_class: "10a".to_string(),
                webdav_url: String::new(),
            },
            User {
                internal_id: 2,
                login: "other".to_string(),
                first_name: String::new(),
                last_name: String::new(),
                email: String::new(),
                school_class: String::new(),
                webdav_url: String::new(),
            },
        ];
        std::fs::write(
            dir.path().join("users.json"),
            serde_json::to_string_pretty(&existing).unwrap(),
        )
        .unwrap();
        let store = UserStore::new(dir.path());

        let user = store.upsert("aschmidt", profile("neu@x.de")).await.unwrap();
        assert_eq!(user.internal_id, 7);
        assert_eq!(user.email, "neu@x.de");

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
        let stored = all.iter().find(|u| u.login == "aschmidt").unwrap();
        assert_eq!(stored.internal_id, 7);
        assert_eq!(stored.email, "neu@x.de");
    }

    #[tokio::test]
    async fn test_new_user_id_follows_maximum() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("users.json"),
            r#"[{"user_id": 7, "username": "seven"}]"#,
        )
        .unwrap();
        let store = UserStore::new(dir.path());

        let user = store.upsert("eight", UserProfile::default()).await.unwrap();
        assert_eq!(user.internal_id, 8);
    }

    #[tokio::test]
    async fn test_concurrent_first_logins_get_distinct_ids() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(UserStore::new(dir.path()));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .upsert(&format!("user{}", i), UserProfile::default())
                        .await
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut ids: Vec<u64> = store.all().await.unwrap().iter().map(|u| u.internal_id).collect();
        ids.sort();
        assert_eq!(ids, (1..=10).collect::<Vec<u64>>());
    }
}
