//! 静态命令前缀匹配

use aixterm_core::data::default_commands;

/// 常用命令语料上的前缀匹配器
#[derive(Debug, Clone)]
pub struct StaticMatcher {
    commands: Vec<String>,
}

impl Default for StaticMatcher {
    fn default() -> Self {
        Self::new(default_commands())
    }
}

impl StaticMatcher {
    pub fn new(commands: Vec<String>) -> Self {
        Self { commands }
    }

    /// 第一个以 `input` 开头且严格更长的命令
    pub fn find(&self, input: &str) -> Option<&str> {
        if input.is_empty() {
            return None;
        }
        self.commands
            .iter()
            .find(|cmd| cmd.len() > input.len() && cmd.starts_with(input))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let matcher = StaticMatcher::new(vec![
            "npm install".to_string(),
            "npm start".to_string(),
        ]);
        assert_eq!(matcher.find("npm"), Some("npm install"));
        assert_eq!(matcher.find("npm s"), Some("npm start"));
    }

    #[test]
    fn test_exact_match_is_not_a_suggestion() {
        let matcher = StaticMatcher::new(vec!["npm start".to_string()]);
        assert_eq!(matcher.find("npm start"), None);
        assert_eq!(matcher.find("npm start --watch"), None);
        assert_eq!(matcher.find(""), None);
    }

    #[test]
    fn test_default_corpus() {
        let matcher = StaticMatcher::default();
        assert!(!matcher.is_empty());
        assert_eq!(matcher.find("git com"), Some("git commit -m \""));
    }
}
