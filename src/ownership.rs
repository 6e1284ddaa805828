use crate::model::{normalize_email, same_email, Classroom};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Owner,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted(Role),
    Denied,
}

impl Access {
    pub fn role(self) -> Option<Role> {
        match self {
            Access::Granted(role) => Some(role),
            Access::Denied => None,
        }
    }
}

/// One place a classroom record may name its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerField {
    /// A single email, or an object with an `email` key.
    Scalar(&'static str),
    /// An array of bare email strings.
    ScalarList(&'static str),
    /// An array of objects each exposing `email`.
    ObjectList(&'static str),
    /// An array of `{email | userEmail, role}` entries; only privileged roles count.
    RoleTaggedMembers(&'static str),
}

/// Every legacy attribute that has ever carried classroom ownership.
pub const OWNER_FIELDS: &[OwnerField] = &[
    OwnerField::Scalar("owner"),
    OwnerField::Scalar("teacher"),
    OwnerField::Scalar("instructor"),
    OwnerField::Scalar("createdBy"),
    OwnerField::Scalar("teacherEmail"),
    OwnerField::Scalar("createdByEmail"),
    OwnerField::Scalar("ownerEmail"),
    OwnerField::ScalarList("teachers"),
    OwnerField::ObjectList("teachers"),
    OwnerField::ScalarList("instructors"),
    OwnerField::ObjectList("instructors"),
    OwnerField::RoleTaggedMembers("members"),
];

const OWNER_ROLES: &[&str] = &["owner", "teacher", "instructor", "admin"];
const MEMBER_IDENTITY_KEYS: &[&str] = &["email", "userEmail"];

fn object_email(value: &Value) -> Option<&str> {
    value.get("email").and_then(Value::as_str)
}

fn member_identity(entry: &Value) -> Option<&str> {
    MEMBER_IDENTITY_KEYS
        .iter()
        .find_map(|k| entry.get(*k).and_then(Value::as_str))
}

fn has_owner_role(entry: &Value) -> bool {
    entry
        .get("role")
        .and_then(Value::as_str)
        .map(|r| r.trim().to_ascii_lowercase())
        .is_some_and(|r| OWNER_ROLES.contains(&r.as_str()))
}

impl OwnerField {
    pub fn key(self) -> &'static str {
        match self {
            OwnerField::Scalar(k)
            | OwnerField::ScalarList(k)
            | OwnerField::ObjectList(k)
            | OwnerField::RoleTaggedMembers(k) => k,
        }
    }

    /// Owner emails this field yields for the given attributes, in order.
    pub fn emails(self, attrs: &Map<String, Value>) -> Vec<&str> {
        let Some(value) = attrs.get(self.key()) else {
            return Vec::new();
        };
        let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
        match self {
            OwnerField::Scalar(_) => value
                .as_str()
                .or_else(|| object_email(value))
                .into_iter()
                .collect(),
            OwnerField::ScalarList(_) => items.iter().filter_map(Value::as_str).collect(),
            OwnerField::ObjectList(_) => items.iter().filter_map(object_email).collect(),
            OwnerField::RoleTaggedMembers(_) => items
                .iter()
                .filter(|m| has_owner_role(m))
                .filter_map(member_identity)
                .collect(),
        }
    }

    pub fn matches(self, attrs: &Map<String, Value>, actor_email: &str) -> bool {
        self.emails(attrs).into_iter().any(|e| same_email(e, actor_email))
    }
}

pub fn resolve_access(classroom: &Classroom, actor_email: &str) -> Access {
    resolve_access_with(OWNER_FIELDS, classroom, actor_email)
}

pub fn resolve_access_with(fields: &[OwnerField], classroom: &Classroom, actor_email: &str) -> Access {
    let actor = normalize_email(actor_email);
    if actor.is_empty() {
        return Access::Denied;
    }
    if let Some(field) = fields.iter().find(|f| f.matches(&classroom.attrs, &actor)) {
        tracing::trace!(classroom = %classroom.id, field = field.key(), "actor resolved as owner");
        return Access::Granted(Role::Owner);
    }
    if classroom.has_student(&actor) {
        return Access::Granted(Role::Member);
    }
    Access::Denied
}

/// The first owner email found, walking the configured fields in order.
pub fn canonical_owner(classroom: &Classroom) -> Option<String> {
    OWNER_FIELDS
        .iter()
        .flat_map(|f| f.emails(&classroom.attrs))
        .map(normalize_email)
        .find(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Student;
    use serde_json::json;

    fn classroom(attrs: Value) -> Classroom {
        Classroom {
            id: "c1".into(),
            name: "Biology".into(),
            subject: None,
            students: vec![Student { email: "kid@x.com".into(), name: "Kid".into() }],
            attrs: attrs.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn access_exposes_granted_role() {
        let c = classroom(json!({ "owner": "t@x.com" }));
        assert_eq!(resolve_access(&c, "t@x.com").role(), Some(Role::Owner));
        assert_eq!(resolve_access(&c, "kid@x.com").role(), Some(Role::Member));
        assert_eq!(resolve_access(&c, "nobody@x.com").role(), None);
    }

    #[test]
    fn every_owner_field_grants_ownership_in_isolation() {
        let cases = vec![
            json!({ "owner": "t@x.com" }),
            json!({ "owner": { "email": "t@x.com" } }),
            json!({ "teacher": "t@x.com" }),
            json!({ "instructor": "t@x.com" }),
            json!({ "createdBy": "t@x.com" }),
            json!({ "teacherEmail": "t@x.com" }),
            json!({ "createdByEmail": "t@x.com" }),
            json!({ "ownerEmail": "t@x.com" }),
            json!({ "teachers": ["other@x.com", "t@x.com"] }),
            json!({ "teachers": [{ "email": "t@x.com" }] }),
            json!({ "instructors": ["t@x.com"] }),
            json!({ "instructors": [{ "email": "t@x.com", "name": "T" }] }),
            json!({ "members": [{ "email": "t@x.com", "role": "teacher" }] }),
            json!({ "members": [{ "userEmail": "t@x.com", "role": "Admin" }] }),
            json!({ "members": [{ "email": "t@x.com", "role": "owner" }] }),
            json!({ "members": [{ "email": "t@x.com", "role": "instructor" }] }),
        ];
        for attrs in cases {
            let c = classroom(attrs.clone());
            assert_eq!(
                resolve_access(&c, "t@x.com"),
                Access::Granted(Role::Owner),
                "attrs: {attrs}"
            );
        }
    }

    #[test]
    fn every_configured_field_is_covered() {
        for field in OWNER_FIELDS {
            let attrs = match field {
                OwnerField::Scalar(k) => json!({ *k: "t@x.com" }),
                OwnerField::ScalarList(k) => json!({ *k: ["t@x.com"] }),
                OwnerField::ObjectList(k) => json!({ *k: [{ "email": "t@x.com" }] }),
                OwnerField::RoleTaggedMembers(k) => json!({ *k: [{ "email": "t@x.com", "role": "owner" }] }),
            };
            let c = classroom(attrs);
            assert!(field.matches(&c.attrs, "t@x.com"), "{field:?}");
            assert_eq!(resolve_access(&c, "t@x.com"), Access::Granted(Role::Owner));
        }
    }

    #[test]
    fn legacy_teachers_array_matches_mixed_case_and_whitespace() {
        let c = classroom(json!({ "teachers": [{ "email": "t@x.com" }] }));
        assert_eq!(resolve_access(&c, "T@X.com "), Access::Granted(Role::Owner));
    }

    #[test]
    fn plain_member_role_does_not_grant_ownership() {
        let c = classroom(json!({ "members": [{ "email": "t@x.com", "role": "student" }] }));
        assert_eq!(resolve_access(&c, "t@x.com"), Access::Denied);
    }

    #[test]
    fn students_resolve_as_members() {
        let c = classroom(json!({ "owner": "t@x.com" }));
        assert_eq!(resolve_access(&c, " KID@x.com"), Access::Granted(Role::Member));
    }

    #[test]
    fn no_field_present_is_denied() {
        let c = classroom(json!({}));
        assert_eq!(resolve_access(&c, "t@x.com"), Access::Denied);
        assert_eq!(resolve_access(&c, ""), Access::Denied);
        assert_eq!(canonical_owner(&c), None);
    }

    #[test]
    fn malformed_fields_are_ignored() {
        let c = classroom(json!({
            "owner": 42,
            "teachers": "t@x.com",
            "members": [{ "role": "owner" }, "t@x.com"]
        }));
        assert_eq!(resolve_access(&c, "t@x.com"), Access::Denied);
    }

    #[test]
    fn canonical_owner_follows_field_order() {
        let c = classroom(json!({
            "teachers": [{ "email": "second@x.com" }],
            "createdBy": " First@X.com"
        }));
        assert_eq!(canonical_owner(&c).as_deref(), Some("first@x.com"));
    }

    #[test]
    fn custom_field_list_is_honoured() {
        let c = classroom(json!({ "headTeacher": "t@x.com" }));
        assert_eq!(resolve_access(&c, "t@x.com"), Access::Denied);
        let fields = [OwnerField::Scalar("headTeacher")];
        assert_eq!(
            resolve_access_with(&fields, &c, "t@x.com"),
            Access::Granted(Role::Owner)
        );
    }
}
