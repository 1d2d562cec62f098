//! 行エディタ。`rustyline` で 1 行ずつ読み取る。
//!
//! raw モードは `read_line` の間だけ有効で、コマンド実行中は cooked モードに戻る。
//! stdin が端末でない場合、`rustyline` はそのまま 1 行ずつ読む。

use std::io;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub struct LineEditor {
    inner: DefaultEditor,
}

impl LineEditor {
    pub fn new() -> io::Result<Self> {
        let inner = DefaultEditor::new().map_err(into_io)?;
        Ok(Self { inner })
    }

    /// 1 行読み取る。
    ///
    /// - EOF (Ctrl+D): `Ok(None)`
    /// - Ctrl+C: 空行として `Ok(Some(""))`
    pub fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        match self.inner.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(into_io(e)),
        }
    }

    /// ↑↓ ナビゲーション用の履歴に追加する。
    pub fn add_history(&mut self, line: &str) {
        if let Err(e) = self.inner.add_history_entry(line) {
            log::debug!("editor history rejected entry: {}", e);
        }
    }
}

fn into_io(e: ReadlineError) -> io::Error {
    match e {
        ReadlineError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}
