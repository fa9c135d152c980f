//! Deterministic fingerprints for cacheable requests.
//!
//! A fingerprint is a blake3 hash over length-delimited components, so
//! distinct component splits can never collide. Equal inputs always hash
//! equal; the role-absent case is distinct from every concrete role.

use blake3::Hasher;
use cubist_types::TidyOptions;

/// Content-hash cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Hash a sequence of components, length-delimiting each one.
    pub fn from_components<'a, I>(components: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut hasher = Hasher::new();
        for component in components {
            hasher.update(&(component.len() as u64).to_le_bytes());
            hasher.update(component);
        }
        Fingerprint(*hasher.finalize().as_bytes())
    }

    /// Hex rendering, used for disk-tier file names.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

fn role_component(role: Option<&str>) -> Vec<u8> {
    match role {
        Some(role) => {
            let mut bytes = b"role:".to_vec();
            bytes.extend_from_slice(role.as_bytes());
            bytes
        }
        None => b"no-role".to_vec(),
    }
}

/// Fingerprint for a query request: connection, role, query text, and the
/// tidy configuration when present. Translation tables contribute as sorted
/// pairs so equal maps hash equal regardless of insertion order.
pub fn query_fingerprint(
    connection: &str,
    role: Option<&str>,
    mdx: &str,
    tidy: Option<&TidyOptions>,
) -> Fingerprint {
    let mut components: Vec<Vec<u8>> = vec![
        b"query".to_vec(),
        connection.as_bytes().to_vec(),
        role_component(role),
        mdx.as_bytes().to_vec(),
    ];
    if let Some(tidy) = tidy {
        components.push(vec![u8::from(tidy.enabled), u8::from(tidy.simplify_names)]);
        if let Some(translations) = &tidy.level_name_translations {
            let mut pairs: Vec<(&String, &String)> = translations.iter().collect();
            pairs.sort();
            for (from, to) in pairs {
                components.push(from.as_bytes().to_vec());
                components.push(to.as_bytes().to_vec());
            }
        }
    }
    Fingerprint::from_components(components.iter().map(Vec::as_slice))
}

/// Fingerprint for a metadata request: connection plus role.
pub fn metadata_fingerprint(connection: &str, role: Option<&str>) -> Fingerprint {
    let components = [
        b"metadata".to_vec(),
        connection.as_bytes().to_vec(),
        role_component(role),
    ];
    Fingerprint::from_components(components.iter().map(Vec::as_slice))
}
