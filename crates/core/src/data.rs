//! 静态数据
//!
//! 内置的常用命令语料，用于零延迟的前缀补全。顺序即匹配优先级。

/// 默认常用命令列表
pub const DEFAULT_COMMANDS: &[&str] = &[
    "ls -lah",
    "npm install",
    "npm start",
    "npm run dev",
    "git checkout ",
    "git commit -m \"",
    "git push origin ",
    "docker-compose up",
    "docker ps -a",
    "mkdir -p ",
    "cd ..",
    "sudo systemctl status ",
    "python3 -m venv ",
    "grep -ri \"",
    "ssh -i ",
    "scp ",
    "curl -X POST ",
    "htop",
    "neofetch",
    "chmod +x ",
    "tail -f ",
];

/// 默认命令列表（拥有所有权，用于配置默认值）
pub fn default_commands() -> Vec<String> {
    DEFAULT_COMMANDS.iter().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_commands_not_empty() {
        assert!(!DEFAULT_COMMANDS.is_empty());
        assert_eq!(default_commands().len(), DEFAULT_COMMANDS.len());
    }

    #[test]
    fn test_default_commands_unique() {
        let mut seen = std::collections::HashSet::new();
        for cmd in DEFAULT_COMMANDS {
            assert!(seen.insert(*cmd), "重复的命令: {cmd}");
        }
    }
}
