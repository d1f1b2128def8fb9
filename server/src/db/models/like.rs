use serde::{Deserialize, Serialize};

/// A user who liked a resource. Identity is the `login` alone; `avatar_url` is display data and may
/// go stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikedBy {
    pub login: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// Likes for a single resource path.
///
/// `count` is always `users.len()`; it is kept on the wire for clients but recomputed from `users`
/// whenever a record is read or mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredLikes")]
pub struct LikeAggregate {
    pub count: u64,
    pub users: Vec<LikedBy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Liked,
    Unliked,
}

impl LikeAggregate {
    pub fn new(users: Vec<LikedBy>) -> Self {
        let mut unique: Vec<LikedBy> = Vec::with_capacity(users.len());
        for user in users {
            if !unique.iter().any(|u| u.login == user.login) {
                unique.push(user);
            }
        }

        Self {
            count: unique.len() as u64,
            users: unique,
        }
    }

    pub fn contains(&self, login: &str) -> bool {
        self.users.iter().any(|u| u.login == login)
    }

    /// Flips `user`'s membership: adds them if absent, removes them if present.
    pub fn toggle(&mut self, user: LikedBy) -> Toggle {
        let toggled = match self.users.iter().position(|u| u.login == user.login) {
            Some(idx) => {
                self.users.remove(idx);
                Toggle::Unliked
            }
            None => {
                self.users.push(user);
                Toggle::Liked
            }
        };

        self.count = self.users.len() as u64;
        toggled
    }
}

/// Shape accepted from the store. A stored `count` is ignored since it can drift from `users`.
#[derive(Deserialize)]
struct StoredLikes {
    #[serde(default)]
    users: Vec<LikedBy>,
}

impl From<StoredLikes> for LikeAggregate {
    fn from(stored: StoredLikes) -> Self {
        Self::new(stored.users)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::models::decode_or_default;

    fn user(login: &str) -> LikedBy {
        LikedBy {
            login: login.to_string(),
            avatar_url: format!("https://avatars.example/{login}"),
        }
    }

    #[test]
    fn test_toggle_is_symmetric() {
        let mut likes = LikeAggregate::new(vec![user("bob")]);
        let original = likes.clone();

        assert_eq!(likes.toggle(user("alice")), Toggle::Liked);
        assert_eq!(likes.count, 2);
        assert!(likes.contains("alice"));

        assert_eq!(likes.toggle(user("alice")), Toggle::Unliked);
        assert_eq!(likes, original);
    }

    #[test]
    fn test_toggle_matches_on_login_only() {
        let mut likes = LikeAggregate::new(vec![user("alice")]);
        let renamed_avatar = LikedBy {
            login: String::from("alice"),
            avatar_url: String::from("https://avatars.example/new"),
        };

        assert_eq!(likes.toggle(renamed_avatar), Toggle::Unliked);
        assert_eq!(likes.count, 0);
        assert!(likes.users.is_empty());
    }

    #[test]
    fn test_stored_count_drift_is_corrected() {
        let raw = r#"{"count":9,"users":[{"login":"alice","avatar_url":"a"},{"login":"alice","avatar_url":"b"}]}"#;
        let likes: LikeAggregate = decode_or_default("/", Some(raw));

        assert_eq!(likes.count, 1);
        assert_eq!(likes.users, vec![LikedBy {
            login: String::from("alice"),
            avatar_url: String::from("a"),
        }]);
    }

    #[test]
    fn test_malformed_records_default() {
        let missing_login: LikeAggregate =
            decode_or_default("/", Some(r#"{"count":1,"users":[{"avatar_url":"a"}]}"#));
        let not_json: LikeAggregate = decode_or_default("/", Some("{"));

        assert_eq!(missing_login, LikeAggregate::default());
        assert_eq!(not_json, LikeAggregate::default());
    }

    #[test]
    fn test_wire_shape() {
        let likes = LikeAggregate::new(vec![user("alice")]);
        let json = serde_json::to_value(&likes).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "count": 1,
                "users": [{ "login": "alice", "avatar_url": "https://avatars.example/alice" }]
            })
        );
    }
}
