//! Group and PIC records loaded from `AssignmentData/`.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

use super::address::normalize;

/// A named collection of sender addresses with an optional direct PIC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(deserialize_with = "super::id_from_string_or_number")]
    pub id: String,
    pub name: String,
    /// Normalized sender addresses.
    #[serde(default, deserialize_with = "normalized_members")]
    pub members: BTreeSet<String>,
    /// Name of the direct default assignee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic_email: Option<String>,
}

impl Group {
    pub fn contains(&self, sender_key: &str) -> bool {
        self.members.contains(sender_key)
    }

    /// The direct PIC as `(name, email)`, if the group names one.
    pub fn direct_pic(&self) -> Option<(&str, &str)> {
        let name = self.pic.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let email = self.pic_email.as_deref().map(str::trim).unwrap_or("");
        Some((name, email))
    }
}

/// A person in charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pic {
    #[serde(deserialize_with = "super::id_from_string_or_number")]
    pub id: String,
    pub name: String,
    pub email: String,
    /// Ids of the groups this person leads.
    #[serde(default, deserialize_with = "group_id_set")]
    pub group_leaderships: BTreeSet<String>,
}

impl Pic {
    pub fn leads(&self, group_id: &str) -> bool {
        self.group_leaderships.contains(group_id)
    }
}

fn normalized_members<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw
        .iter()
        .map(|m| normalize(m))
        .filter(|m| !m.is_empty())
        .collect())
}

fn group_id_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Id(#[serde(deserialize_with = "super::id_from_string_or_number")] String);

    let raw = Vec::<Id>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|id| id.0).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_members_are_normalized() {
        let json = r#"{
            "id": 1757390072466,
            "name": "Galaxy Store",
            "members": ["Duongg@Gmail.com ", "duongg@gmail.com", ""]
        }"#;
        let g: Group = serde_json::from_str(json).expect("parse");
        assert_eq!(g.id, "1757390072466");
        assert_eq!(g.members.len(), 1);
        assert!(g.contains("duongg@gmail.com"));
        assert_eq!(g.direct_pic(), None);
    }

    #[test]
    fn test_blank_direct_pic_is_ignored() {
        let json = r#"{"id": "g1", "name": "Sales", "members": [], "pic": "  ", "picEmail": "x@y.z"}"#;
        let g: Group = serde_json::from_str(json).expect("parse");
        assert_eq!(g.direct_pic(), None);
    }

    #[test]
    fn test_pic_leaderships_accept_numbers() {
        let json = r#"{
            "id": "1759336936889",
            "name": "Dương",
            "email": "duongnguyen@gmail.com",
            "groupLeaderships": [1757390072466, "g2"]
        }"#;
        let p: Pic = serde_json::from_str(json).expect("parse");
        assert!(p.leads("1757390072466"));
        assert!(p.leads("g2"));
        assert!(!p.leads("g3"));
    }
}
