//! コマンド履歴の記録。`history` ビルトインが参照する。
//!
//! `~/.sish_history` にプレーンテキスト（1 行 1 コマンド）で永続化し、起動時に読み込む。
//! ↑↓ キーでの呼び出しは [`editor`](crate::editor) 側が持つので、ここは記録と列挙のみ。
//!
//! - 書き込み: 追記モード（[`OpenOptions::append`]）で 1 コマンドずつ追記
//! - 最大エントリ数を超えたら古いものから捨てる
//! - 空行は記録しない。重複はそのまま記録する（入力された回数だけ表示する）

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// 入力履歴。古い順に保持する。
pub struct History {
    entries: Vec<String>,
    max_size: usize,
    /// 永続化先。`None` ならメモリ上のみ。
    path: Option<PathBuf>,
}

impl History {
    /// ファイルに永続化する履歴を作り、既存エントリを読み込む。
    pub fn open(path: PathBuf, max_size: usize) -> Self {
        let mut h = Self {
            entries: Vec::new(),
            max_size,
            path: Some(path),
        };
        h.load();
        h
    }

    /// メモリ上のみの履歴。
    pub fn in_memory(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_size,
            path: None,
        }
    }

    /// 履歴ファイルからエントリを読み込む。ファイルが存在しなければ何もしない。
    fn load(&mut self) {
        let Some(path) = self.path.clone() else { return };
        match fs::File::open(&path) {
            Ok(file) => {
                let reader = BufReader::new(file);
                for line in reader.lines().map_while(Result::ok) {
                    if !line.is_empty() {
                        self.entries.push(line);
                    }
                }
                self.truncate_front();
                log::debug!("loaded {} history entries from {}", self.entries.len(), path.display());
            }
            Err(e) => log::debug!("no history at {}: {}", path.display(), e),
        }
    }

    /// エントリを追加し、ファイルにも追記する。空行はスキップ。
    pub fn add(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.entries.push(line.to_string());
        self.truncate_front();

        if let Some(path) = &self.path {
            let written = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| writeln!(file, "{}", line));
            if let Err(e) = written {
                log::warn!("couldn't append to {}: {}", path.display(), e);
            }
        }
    }

    fn truncate_front(&mut self) {
        if self.entries.len() > self.max_size {
            let excess = self.entries.len() - self.max_size;
            self.entries.drain(..excess);
        }
    }

    /// 全エントリ（古い順）。
    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_skips_empty_keeps_duplicates() {
        let mut h = History::in_memory(10);
        h.add("");
        h.add("  ");
        assert!(h.entries().is_empty());

        h.add("ls");
        h.add("ls");
        h.add("  cd /tmp  ");
        assert_eq!(h.entries(), &["ls", "ls", "cd /tmp"]);
    }

    #[test]
    fn oldest_entries_dropped_at_capacity() {
        let mut h = History::in_memory(2);
        h.add("a");
        h.add("b");
        h.add("c");
        assert_eq!(h.entries(), &["b", "c"]);
    }

    #[test]
    fn persisted_entries_reload() {
        let path = std::env::temp_dir().join(format!("sish_history_test_{}", std::process::id()));
        let _ = fs::remove_file(&path);

        let mut h = History::open(path.clone(), 100);
        assert!(h.entries().is_empty());
        h.add("echo one");
        h.add("echo two");

        let reloaded = History::open(path.clone(), 100);
        assert_eq!(reloaded.entries(), &["echo one", "echo two"]);

        let capped = History::open(path.clone(), 1);
        assert_eq!(capped.entries(), &["echo two"]);

        fs::remove_file(&path).unwrap();
    }
}
