use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::AgencyId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub agency_id: AgencyId,
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn has_contact_method(&self) -> bool {
        let email_present = self.email.as_deref().is_some_and(|value| !value.trim().is_empty());
        let phone_present = self.phone.as_deref().is_some_and(|value| !value.trim().is_empty());
        email_present || phone_present
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Client, ClientId};
    use crate::domain::AgencyId;

    fn client(email: Option<&str>, phone: Option<&str>) -> Client {
        Client {
            id: ClientId("client-1".to_string()),
            agency_id: AgencyId("agency-1".to_string()),
            display_name: "Dana Reyes".to_string(),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn either_email_or_phone_counts_as_contact_method() {
        assert!(client(Some("dana@example.com"), None).has_contact_method());
        assert!(client(None, Some("+1-555-0100")).has_contact_method());
        assert!(!client(None, None).has_contact_method());
    }

    #[test]
    fn blank_contact_values_do_not_count() {
        assert!(!client(Some("  "), Some("")).has_contact_method());
    }
}
