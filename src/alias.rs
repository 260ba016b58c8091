use crate::pipeline::split_words;
use std::collections::BTreeMap;

/// Name -> replacement text for the first word of a command.
#[derive(Debug, Clone, Default)]
pub struct Aliases {
    entries: BTreeMap<String, String>,
}

impl Aliases {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    /// Entries sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace an aliased program name with the words of its value.
    ///
    /// One level only: the words produced are not looked up again, so an
    /// alias may refer to a command of the same name.
    pub fn expand(&self, argv: &[String]) -> Vec<String> {
        let Some((name, rest)) = argv.split_first() else {
            return Vec::new();
        };
        match self.get(name) {
            Some(value) => {
                let mut words = split_words(value);
                words.extend_from_slice(rest);
                words
            }
            None => argv.to_vec(),
        }
    }
}

/// Parse the argument of `alias`: `name=value`, with one pair of surrounding
/// quotes removed from the value.
pub fn parse_definition(text: &str) -> Option<(&str, &str)> {
    let (name, value) = text.split_once('=')?;
    if name.is_empty() {
        return None;
    }
    let value = ['\'', '"']
        .iter()
        .find_map(|q| value.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)))
        .unwrap_or(value);
    Some((name, value))
}
