use crate::common::Phone;

/// Key pattern with a single `{}` placeholder for the identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate(String);

impl KeyTemplate {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn render(&self, identity: &Phone) -> String {
        self.0.replacen("{}", identity.as_str(), 1)
    }
}

/// Rendered keys for one entity in one flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowKeys {
    pub code: String,
    pub token: String,
    pub resend: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let phone = Phone::parse("+79871111111").unwrap();
        let template = KeyTemplate::new("user:{}:signup:code");
        assert_eq!(template.render(&phone), "user:+79871111111:signup:code");
    }
}
