//! 1 行分の評価: パース → ビルトイン or 外部コマンド起動 → ジョブのポーリング。
//!
//! - 空行（`&` のみの行を含む）: ポーリングのみ
//! - ビルトイン（行末 `&` があってもプロセス内で実行）: [`builtins::run`]
//! - それ以外: [`spawn::launch`]。バックグラウンドなら `[N] pid` を表示
//!
//! `exit` 以外では最後に必ず 1 回 [`JobTable::poll`](crate::job::JobTable::poll) を行うので、
//! バックグラウンドジョブの完了はループ 1 周以内に通知される。

use std::io::{self, Write};

use crate::builtins::{self, Flow};
use crate::job::WaitPid;
use crate::parser;
use crate::shell::Shell;
use crate::spawn::{self, Launched};

/// 1 行を評価する。`exit` なら `shell.should_exit` を立てる。
///
/// 戻り値のエラーは `out` への書き込み失敗のみ。起動失敗は stderr に報告して続行する。
pub fn execute(shell: &mut Shell, line: &str, out: &mut dyn Write) -> io::Result<()> {
    if let Some(parsed) = parser::parse_line(line) {
        let command = parsed.command;
        if let Some(builtin) = command.builtin() {
            if builtins::run(shell, builtin, &command, out)? == Flow::Exit {
                shell.should_exit = true;
                return Ok(());
            }
        } else {
            match spawn::launch(command, parsed.background, shell.terminal, &mut shell.jobs) {
                Ok(Launched::Background { pid, number }) => {
                    writeln!(out, "[{}] {}", number, pid)?;
                    shell.last_status = 0;
                }
                Ok(Launched::Foreground { status, .. }) => {
                    shell.last_status = status.unwrap_or(0);
                }
                Err(e) => {
                    eprintln!("sish: {}", e);
                    shell.last_status = 1;
                }
            }
        }
    }

    shell.jobs.poll(false, &mut WaitPid, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;

    fn shell() -> Shell {
        Shell::new(History::in_memory(100), None)
    }

    fn exec(shell: &mut Shell, line: &str) -> String {
        let mut out = Vec::new();
        execute(shell, line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn exit_stops_loop() {
        let mut sh = shell();
        exec(&mut sh, "  exit  ");
        assert!(sh.should_exit);
    }

    #[test]
    fn blank_line_only_polls() {
        let mut sh = shell();
        assert_eq!(exec(&mut sh, "   "), "");
        assert_eq!(exec(&mut sh, "&"), "");
        assert!(!sh.should_exit);
        assert!(sh.jobs.is_empty());
    }

    #[test]
    fn cd_nonexistent_keeps_running() {
        let _guard = crate::builtins::tests::CWD_LOCK.lock().unwrap();
        let before = std::env::current_dir().unwrap();
        let mut sh = shell();
        assert_eq!(exec(&mut sh, "cd /nonexistent"), "");
        assert_eq!(sh.last_status, 1);
        assert!(!sh.should_exit);
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn foreground_status_recorded() {
        let mut sh = shell();
        exec(&mut sh, "false");
        assert_eq!(sh.last_status, 1);
        exec(&mut sh, "true a&b");
        assert_eq!(sh.last_status, 0);
        assert!(sh.jobs.is_empty());
    }

    #[test]
    fn trailing_ampersand_backgrounds_without_blocking() {
        let mut sh = shell();
        let start = std::time::Instant::now();
        let out = exec(&mut sh, "sleep 30 &");
        assert!(start.elapsed() < std::time::Duration::from_secs(10));

        let job = sh.jobs.iter().next().expect("job recorded");
        assert_eq!(job.number, 1);
        assert_eq!(job.command.to_string(), "sleep 30");
        assert_eq!(out, format!("[1] {}\n", job.pid));

        let pid = job.pid;
        unsafe {
            libc::kill(pid, libc::SIGKILL);
            libc::waitpid(pid, std::ptr::null_mut(), 0);
        }
        assert_eq!(exec(&mut sh, ""), "[1] done sleep 30 &\n");
        assert!(sh.jobs.is_empty());
    }

    #[test]
    fn exit_with_outstanding_jobs_releases_them() {
        let mut sh = shell();
        exec(&mut sh, "sleep 30 &");
        let pid = sh.jobs.iter().next().unwrap().pid;
        exec(&mut sh, "exit");
        assert!(sh.should_exit);

        sh.jobs.destroy();
        assert!(sh.jobs.is_empty());
        unsafe {
            libc::kill(pid, libc::SIGKILL);
            libc::waitpid(pid, std::ptr::null_mut(), 0);
        }
    }
}
