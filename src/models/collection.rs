use std::collections::BTreeMap;

use serde::Serialize;

/// A property value that becomes a list once its element name repeats
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Single(String),
    Multiple(Vec<String>),
}

impl PropertyValue {
    /// Appends a value, promoting a scalar into a two-element list
    pub fn push(&mut self, value: String) {
        match self {
            PropertyValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = PropertyValue::Multiple(vec![first, value]);
            }
            PropertyValue::Multiple(values) => values.push(value),
        }
    }

    /// First value in document order
    pub fn first(&self) -> Option<&str> {
        match self {
            PropertyValue::Single(value) => Some(value),
            PropertyValue::Multiple(values) => values.first().map(String::as_str),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            PropertyValue::Single(value) => vec![value.as_str()],
            PropertyValue::Multiple(values) => values.iter().map(String::as_str).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PropertyValue::Single(_) => 1,
            PropertyValue::Multiple(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stack-and-save: the first occurrence sets a scalar, later ones build a list
pub fn stack_and_save(properties: &mut BTreeMap<String, PropertyValue>, key: &str, value: String) {
    match properties.get_mut(key) {
        Some(existing) => existing.push(value),
        None => {
            properties.insert(key.to_string(), PropertyValue::Single(value));
        }
    }
}

/// One packaging format a collection accepts, with its quality rank
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptPackaging {
    /// Preference in [0, 1]; 1.0 when the server gave none
    pub rank: f32,
    pub value: String,
}

/// A deposit target advertised by the service document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    /// Where packages are POSTed. `None` only when the server omitted `href`.
    pub deposit_url: Option<String>,
    pub title: Option<String>,
    pub accept_packaging: Vec<AcceptPackaging>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Collection {
    pub fn new(deposit_url: Option<String>) -> Self {
        Self {
            deposit_url,
            title: None,
            accept_packaging: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Property lookup by element local name
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn save_property(&mut self, name: &str, value: String) {
        stack_and_save(&mut self.properties, name, value);
    }

    /// Highest-ranked packaging format; the earliest wins a tie
    pub fn preferred_packaging(&self) -> Option<&AcceptPackaging> {
        self.accept_packaging
            .iter()
            .fold(None, |best: Option<&AcceptPackaging>, candidate| match best {
                Some(current) if current.rank >= candidate.rank => Some(current),
                _ => Some(candidate),
            })
    }

    pub fn accepts_packaging(&self, packaging: &str) -> bool {
        self.accept_packaging
            .iter()
            .any(|accepted| accepted.value.trim() == packaging.trim())
    }

    /// True when the trimmed deposit URL equals the trimmed selector
    pub fn matches_url(&self, url: &str) -> bool {
        self.deposit_url
            .as_deref()
            .map(|deposit_url| deposit_url.trim() == url.trim())
            .unwrap_or(false)
    }

    /// Trimmed, case-insensitive title comparison
    pub fn matches_title(&self, title: &str) -> bool {
        self.title
            .as_deref()
            .map(|own| own.trim().to_lowercase() == title.trim().to_lowercase())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_and_save_promotes_on_second_occurrence() {
        let mut properties = BTreeMap::new();
        stack_and_save(&mut properties, "accept", "application/zip".to_string());
        assert_eq!(
            properties.get("accept"),
            Some(&PropertyValue::Single("application/zip".to_string()))
        );

        stack_and_save(&mut properties, "accept", "application/xml".to_string());
        stack_and_save(&mut properties, "accept", "text/plain".to_string());
        assert_eq!(
            properties.get("accept"),
            Some(&PropertyValue::Multiple(vec![
                "application/zip".to_string(),
                "application/xml".to_string(),
                "text/plain".to_string(),
            ]))
        );
    }

    #[test]
    fn test_property_value_accessors() {
        let single = PropertyValue::Single("a".to_string());
        assert_eq!(single.first(), Some("a"));
        assert_eq!(single.len(), 1);

        let multiple = PropertyValue::Multiple(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(multiple.values(), vec!["a", "b"]);
        assert_eq!(multiple.len(), 2);
    }

    #[test]
    fn test_preferred_packaging_picks_highest_rank() {
        let mut collection = Collection::new(Some("http://localhost/deposit/1".to_string()));
        collection.accept_packaging = vec![
            AcceptPackaging { rank: 0.5, value: "http://purl.org/net/sword-types/bagit".to_string() },
            AcceptPackaging { rank: 1.0, value: "http://purl.org/net/sword-types/METSDSpaceSIP".to_string() },
            AcceptPackaging { rank: 1.0, value: "http://purl.org/net/sword-types/other".to_string() },
        ];

        let preferred = collection.preferred_packaging().unwrap();
        assert_eq!(preferred.value, "http://purl.org/net/sword-types/METSDSpaceSIP");
        assert!(collection.accepts_packaging(" http://purl.org/net/sword-types/bagit "));
        assert!(!collection.accepts_packaging("http://example.org/unknown"));
    }

    #[test]
    fn test_matchers_trim_and_ignore_title_case() {
        let mut collection = Collection::new(Some(" http://localhost/deposit/2 ".to_string()));
        collection.title = Some("  Theses and Dissertations ".to_string());

        assert!(collection.matches_url("http://localhost/deposit/2"));
        assert!(!collection.matches_url("http://localhost/deposit/3"));
        assert!(collection.matches_title("theses AND dissertations"));
        assert!(!Collection::new(None).matches_url(""));
    }
}
