//! Sender header parsing shared by the classifier and the extractor.

/// A `From` header split into display name and address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderAddress {
    /// Display name with surrounding quotes removed; empty if absent.
    pub name: String,
    /// Bare address, if one could be found.
    pub address: Option<String>,
}

impl SenderAddress {
    /// Parse `"Name" <addr>`, `Name <addr>`, `<addr>` or a bare `addr`.
    pub fn parse(header: &str) -> Self {
        let header = header.trim();

        if let Some(open) = header.rfind('<')
            && let Some(close) = header[open..].find('>')
        {
            let address = header[open + 1..open + close].trim();
            let name = header[..open].trim().trim_matches(|c| c == '"' || c == '\'').trim();
            return Self {
                name: name.to_string(),
                address: is_address(address).then(|| address.to_string()),
            };
        }

        if is_address(header) {
            return Self {
                name: String::new(),
                address: Some(header.to_string()),
            };
        }

        Self {
            name: String::new(),
            address: None,
        }
    }

    /// Lower-cased domain of the address.
    pub fn domain(&self) -> Option<String> {
        self.address
            .as_deref()
            .and_then(|a| a.rsplit_once('@'))
            .map(|(_, d)| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
    }
}

fn is_address(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !s.contains(char::is_whitespace)
        }
        None => false,
    }
}
