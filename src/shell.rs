//! シェルセッション: 対話モードの初期化と後片付け、プロンプトの保持。
//!
//! ## 初期化 ([`Session::init`])
//!
//! 1. `$MY_PROMPT` からプロンプトを解決してセッションに保持
//! 2. stdin が端末かどうかで対話モードを判定
//! 3. 対話モードなら:
//!    - 自分のプロセスグループが端末のフォアグラウンドになるまで `SIGTTIN` を自グループに送る
//!    - ジョブ制御シグナル 5 種と `SIGCHLD` を無視（完了はポーリングで検出する）
//!    - 自分の PID をプロセスグループ ID にする。失敗したら [`SessionError`]
//!    - 端末のフォアグラウンドを取得し、端末属性を保存
//!
//! デバッガ配下では手順 3 のループが終わらないことがある（既知の制限）。
//!
//! ## 後片付け ([`Session::teardown`])
//!
//! 保存した端末属性を戻し、5 種のシグナルを `SIG_DFL` に戻す。
//!
//! REPL ループ 1 周ごとに参照・更新される状態（ジョブテーブル、履歴、終了フラグ）は
//! [`Shell`] が持つ。

use std::io;
use std::os::unix::io::RawFd;

use libc::{c_int, pid_t};

use crate::history::History;
use crate::job::JobTable;

/// シェルが無視し、フォアグラウンドの子で `SIG_DFL` に戻すシグナル。
pub const JOB_CONTROL_SIGNALS: [c_int; 5] = [
    libc::SIGINT,
    libc::SIGQUIT,
    libc::SIGTSTP,
    libc::SIGTTIN,
    libc::SIGTTOU,
];

/// 対話モード初期化の失敗。セッション全体にとって致命的。
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("couldn't put the shell in its own process group: {0}")]
    ProcessGroup(#[source] io::Error),
    #[error("couldn't query the terminal foreground group: {0}")]
    Foreground(#[source] io::Error),
}

// ── 端末制御 ─────────────────────────────────────────────────────────

/// 制御端末とシェル自身のプロセスグループの組。対話モードでのみ存在する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminal {
    pub fd: RawFd,
    pub shell_pgid: pid_t,
}

impl Terminal {
    /// `tcsetpgrp` で端末のフォアグラウンドを `pgid` に渡す。
    ///
    /// シェルは `SIGTTOU` を無視しているので、バックグラウンドから呼んでも止まらない。
    pub fn give_to(&self, pgid: pid_t) -> io::Result<()> {
        if unsafe { libc::tcsetpgrp(self.fd, pgid) } != 0 {
            return Err(io::Error::last_os_error());
        }
        log::debug!("terminal {} handed to pgid {}", self.fd, pgid);
        Ok(())
    }

    /// 端末のフォアグラウンドをシェルのグループに戻す。
    pub fn take_back(&self) -> io::Result<()> {
        self.give_to(self.shell_pgid)
    }
}

// ── シグナル ─────────────────────────────────────────────────────────

/// `signals` の処理を `handler`（`SIG_IGN` / `SIG_DFL`）に設定する。
pub fn set_dispositions(signals: &[c_int], handler: libc::sighandler_t) {
    for &sig in signals {
        unsafe {
            libc::signal(sig, handler);
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// 対話セッションの状態。REPL ループの開始前に 1 回だけ作られる。
pub struct Session {
    /// stdin が端末なら `true`。
    pub interactive: bool,
    /// シェルのプロセスグループ ID。
    pub pgid: pid_t,
    /// 端末の fd（常に `STDIN_FILENO`）。
    pub terminal_fd: RawFd,
    /// 初期化時に保存した端末属性。非対話モードでは `None`。
    saved_modes: Option<libc::termios>,
    prompt: String,
}

impl Session {
    /// セッションを初期化する。非対話モードではプロンプト解決のみ行う。
    pub fn init(prompt: String) -> Result<Self, SessionError> {
        let terminal_fd = libc::STDIN_FILENO;
        let interactive = unsafe { libc::isatty(terminal_fd) } == 1;
        let mut session = Self {
            interactive,
            pgid: unsafe { libc::getpgrp() },
            terminal_fd,
            saved_modes: None,
            prompt,
        };

        if interactive {
            session.acquire_terminal()?;
        }
        log::debug!(
            "session started: interactive={} pgid={}",
            session.interactive,
            session.pgid
        );
        Ok(session)
    }

    fn acquire_terminal(&mut self) -> Result<(), SessionError> {
        // フォアグラウンドになるまで待つ
        loop {
            let fg = unsafe { libc::tcgetpgrp(self.terminal_fd) };
            if fg < 0 {
                return Err(SessionError::Foreground(io::Error::last_os_error()));
            }
            self.pgid = unsafe { libc::getpgrp() };
            if fg == self.pgid {
                break;
            }
            unsafe {
                libc::kill(-self.pgid, libc::SIGTTIN);
            }
        }

        set_dispositions(&JOB_CONTROL_SIGNALS, libc::SIG_IGN);
        set_dispositions(&[libc::SIGCHLD], libc::SIG_IGN);

        let pid = unsafe { libc::getpid() };
        if self.pgid != pid && unsafe { libc::setpgid(pid, pid) } < 0 {
            return Err(SessionError::ProcessGroup(io::Error::last_os_error()));
        }
        self.pgid = pid;

        let terminal = Terminal {
            fd: self.terminal_fd,
            shell_pgid: pid,
        };
        if let Err(e) = terminal.take_back() {
            log::warn!("couldn't take the terminal: {}", e);
        }

        let mut modes: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(self.terminal_fd, &mut modes) } == 0 {
            self.saved_modes = Some(modes);
        } else {
            log::warn!(
                "couldn't save terminal attributes: {}",
                io::Error::last_os_error()
            );
        }
        Ok(())
    }

    /// 対話モードなら端末ハンドルを返す。フォアグラウンド起動時の受け渡しに使う。
    pub fn terminal(&self) -> Option<Terminal> {
        self.interactive.then_some(Terminal {
            fd: self.terminal_fd,
            shell_pgid: self.pgid,
        })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// 端末属性とシグナル処理を戻す。プロンプトはここで解放される。
    pub fn teardown(self) {
        if let Some(modes) = &self.saved_modes {
            if unsafe { libc::tcsetattr(self.terminal_fd, libc::TCSADRAIN, modes) } != 0 {
                log::warn!(
                    "couldn't restore terminal attributes: {}",
                    io::Error::last_os_error()
                );
            }
        }
        set_dispositions(&JOB_CONTROL_SIGNALS, libc::SIG_DFL);
        log::debug!("session closed");
    }
}

// ── Shell ───────────────────────────────────────────────────────────

/// REPL ループの実行状態。ループが所有し、executor と builtins に `&mut` で渡される。
pub struct Shell {
    /// バックグラウンドジョブ。
    pub jobs: JobTable,
    /// `history` ビルトインが表示する入力履歴。
    pub history: History,
    /// 対話モードなら端末ハンドル。
    pub terminal: Option<Terminal>,
    /// 直前のコマンドの終了ステータス。
    pub last_status: i32,
    /// `exit` ビルトインで true にセットされ、REPL ループを終了させる。
    pub should_exit: bool,
}

impl Shell {
    pub fn new(history: History, terminal: Option<Terminal>) -> Self {
        Self {
            jobs: JobTable::new(),
            history,
            terminal,
            last_status: 0,
            should_exit: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_control_signals_cover_keyboard_and_tty_stops() {
        for sig in [
            libc::SIGINT,
            libc::SIGQUIT,
            libc::SIGTSTP,
            libc::SIGTTIN,
            libc::SIGTTOU,
        ] {
            assert!(JOB_CONTROL_SIGNALS.contains(&sig));
        }
        assert!(!JOB_CONTROL_SIGNALS.contains(&libc::SIGCHLD));
    }

    #[test]
    fn non_interactive_session_has_no_terminal() {
        // テストハーネス下の stdin が端末でない場合のみ検証する
        if unsafe { libc::isatty(libc::STDIN_FILENO) } == 1 {
            return;
        }
        let session = Session::init("test> ".into()).unwrap();
        assert!(!session.interactive);
        assert_eq!(session.terminal(), None);
        assert_eq!(session.prompt(), "test> ");
        session.teardown();
    }
}
