//! 会话输出尾部缓存
//!
//! 为预测请求提供纯文本上下文。不做屏幕仿真，只剥离 CSI / OSC 转义序列
//! 和回车符，并按字节上限保留最近的输出。

use dashmap::DashMap;

/// 每个会话保留的最大字节数
pub const DEFAULT_TAIL_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum EscapeState {
    #[default]
    Text,
    /// 刚读到 ESC
    Escape,
    /// ESC [ ... 直到终止字节
    Csi,
    /// ESC ] ... 直到 BEL 或 ST
    Osc,
    /// OSC 内读到 ESC，等待 `\`
    OscEscape,
}

#[derive(Debug, Default)]
struct TailBuffer {
    text: String,
    state: EscapeState,
    /// 跨块的未完成 UTF-8 字节
    pending: Vec<u8>,
}

impl TailBuffer {
    fn push(&mut self, data: &[u8], max_bytes: usize) {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(data);

        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    self.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // valid_up_to 之前保证是合法 UTF-8
                    self.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            self.push_char(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        self.trim(max_bytes);
    }

    fn push_str(&mut self, s: &str) {
        for c in s.chars() {
            self.push_char(c);
        }
    }

    fn push_char(&mut self, c: char) {
        self.state = match (self.state, c) {
            (EscapeState::Text, '\x1b') => EscapeState::Escape,
            (EscapeState::Text, '\r') => EscapeState::Text,
            (EscapeState::Text, c) => {
                if c == '\n' || c == '\t' || !c.is_control() {
                    self.text.push(c);
                }
                EscapeState::Text
            }
            (EscapeState::Escape, '[') => EscapeState::Csi,
            (EscapeState::Escape, ']') => EscapeState::Osc,
            // 其他双字节序列，如 ESC = / ESC >
            (EscapeState::Escape, _) => EscapeState::Text,
            (EscapeState::Csi, c) if ('\x40'..='\x7e').contains(&c) => EscapeState::Text,
            (EscapeState::Csi, _) => EscapeState::Csi,
            (EscapeState::Osc, '\x07') => EscapeState::Text,
            (EscapeState::Osc, '\x1b') => EscapeState::OscEscape,
            (EscapeState::Osc, _) => EscapeState::Osc,
            (EscapeState::OscEscape, '\\') => EscapeState::Text,
            (EscapeState::OscEscape, _) => EscapeState::Osc,
        };
    }

    fn trim(&mut self, max_bytes: usize) {
        if self.text.len() <= max_bytes {
            return;
        }
        let mut cut = self.text.len() - max_bytes;
        while !self.text.is_char_boundary(cut) {
            cut += 1;
        }
        self.text.drain(..cut);
    }

    fn last_lines(&self, lines: usize) -> String {
        let all: Vec<&str> = self.text.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// 所有会话的输出尾部
pub struct OutputTail {
    tails: DashMap<String, TailBuffer>,
    max_bytes: usize,
}

impl Default for OutputTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_BYTES)
    }
}

impl OutputTail {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            tails: DashMap::new(),
            max_bytes,
        }
    }

    /// 追加会话输出
    pub fn record(&self, session_id: &str, data: &[u8]) {
        self.tails
            .entry(session_id.to_string())
            .or_default()
            .push(data, self.max_bytes);
    }

    /// 会话最近 `lines` 行文本
    pub fn recent_lines(&self, session_id: &str, lines: usize) -> String {
        self.tails
            .get(session_id)
            .map(|t| t.last_lines(lines))
            .unwrap_or_default()
    }

    pub fn remove(&self, session_id: &str) {
        self.tails.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_csi_and_carriage_returns() {
        let tail = OutputTail::default();
        tail.record("a", b"\x1b[1;32muser@host\x1b[0m:~$ ls\r\nsrc\r\n");
        assert_eq!(tail.recent_lines("a", 50), "user@host:~$ ls\nsrc");
    }

    #[test]
    fn test_strips_osc_title() {
        let tail = OutputTail::default();
        tail.record("a", b"\x1b]0;title\x07prompt$ \x1b]2;x\x1b\\done");
        assert_eq!(tail.recent_lines("a", 50), "prompt$ done");
    }

    #[test]
    fn test_escape_split_across_chunks() {
        let tail = OutputTail::default();
        tail.record("a", b"abc\x1b[3");
        tail.record("a", b"1mred\x1b[0m");
        assert_eq!(tail.recent_lines("a", 50), "abcred");
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let tail = OutputTail::default();
        let text = "你好".as_bytes();
        tail.record("a", &text[..2]);
        tail.record("a", &text[2..]);
        assert_eq!(tail.recent_lines("a", 50), "你好");
    }

    #[test]
    fn test_recent_lines_limit() {
        let tail = OutputTail::default();
        tail.record("a", b"1\n2\n3\n4\n");
        assert_eq!(tail.recent_lines("a", 2), "3\n4");
    }

    #[test]
    fn test_byte_cap_keeps_newest() {
        let tail = OutputTail::new(8);
        tail.record("a", b"0123456789abcdef");
        assert_eq!(tail.recent_lines("a", 50), "89abcdef");
    }

    #[test]
    fn test_sessions_are_independent() {
        let tail = OutputTail::default();
        tail.record("a", b"alpha");
        tail.record("b", b"beta");
        tail.remove("a");
        assert_eq!(tail.recent_lines("a", 50), "");
        assert_eq!(tail.recent_lines("b", 50), "beta");
    }
}
