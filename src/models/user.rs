use serde::{Deserialize, Serialize};

/// A Nextcloud account as recorded in `users.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "user_id")]
    pub internal_id: u64,
    #[serde(rename = "username")]
    pub login: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub school_class: String,
    #[serde(default)]
    pub webdav_url: String,
}

impl User {
    pub fn apply_profile(&mut self, profile: UserProfile) {
        self.first_name = profile.first_name;
        self.last_name = profile.last_name;
        self.email = profile.email;
        self.school_class = profile.school_class;
        self.webdav_url = profile.webdav_url;
    }
}

/// Fields scraped from the Nextcloud settings page. Any of them may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub school_class: String,
    pub webdav_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_keys_match_users_file() {
        let user = User {
            internal_id: 3,
            login: "mmuster".to_string(),
            first_name: "Max".to_string(),
            last_name: "Muster".to_string(),
            email: "max@schule.example".to_string(),
            school_class: "10b".to_string(),
            webdav_url: String::new(),
        };

        let json = serde_json::to_value(&user).unwrap();
        for key in [
            "user_id",
            "username",
            "first_name",
            "last_name",
            "email",
            "school_class",
            "webdav_url",
        ] {
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(json["user_id"], 3);
    }
}
