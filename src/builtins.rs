//! ビルトインコマンドの実装。
//!
//! ビルトインは fork/exec を経由せずプロセス内で直接実行される。
//! 種別の判定はパース時に済んでいる（[`Builtin`]）ので、ここでは実行のみ行う。
//!
//! | コマンド | 動作 |
//! |----------|------|
//! | `exit` | [`Flow::Exit`] を返す。プロセスの終了は REPL ループが行う |
//! | `cd [dir]` | 引数 → `$HOME` → パスワードデータベースの順に移動先を決める。失敗は表示しない |
//! | `jobs` | 全ジョブを報告し、完了したものを削除する |
//! | `history` | 入力履歴を古い順に表示する |

use std::env;
use std::ffi::{CStr, OsStr};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use crate::config::HOME_ENV_VARIABLE;
use crate::job::WaitPid;
use crate::parser::{Builtin, Command};
use crate::shell::Shell;

/// ビルトイン実行後に REPL ループが取るべき動作。
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// `cd` の失敗。
#[derive(Debug, thiserror::Error)]
pub enum CdError {
    #[error("no home directory")]
    NoHome,
    #[error("{}: {source}", .path.display())]
    Chdir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// ビルトインを実行する。出力は `out` に書く。
///
/// `cd` の失敗は `last_status = 1` にするだけでメッセージは出さない。
pub fn run(
    shell: &mut Shell,
    builtin: Builtin,
    command: &Command,
    out: &mut dyn Write,
) -> io::Result<Flow> {
    match builtin {
        Builtin::Exit => return Ok(Flow::Exit),
        Builtin::Cd => {
            shell.last_status = match change_dir(command.arg(1)) {
                Ok(_) => 0,
                Err(e) => {
                    log::debug!("cd failed: {}", e);
                    1
                }
            };
        }
        Builtin::Jobs => {
            shell.jobs.poll(true, &mut WaitPid, out)?;
            shell.last_status = 0;
        }
        Builtin::History => {
            for entry in shell.history.entries() {
                writeln!(out, "{}", entry)?;
            }
            shell.last_status = 0;
        }
    }
    Ok(Flow::Continue)
}

/// `cd [dir]` — カレントディレクトリを変更し、移動先を返す。
pub fn change_dir(dir: Option<&str>) -> Result<PathBuf, CdError> {
    let target = resolve_target(dir, env::var_os(HOME_ENV_VARIABLE).map(PathBuf::from), home_from_passwd)?;
    env::set_current_dir(&target).map_err(|source| CdError::Chdir {
        path: target.clone(),
        source,
    })?;
    Ok(target)
}

/// 移動先を決める: 引数 → `home_env` → `passwd()`。
fn resolve_target(
    dir: Option<&str>,
    home_env: Option<PathBuf>,
    passwd: impl FnOnce() -> Option<PathBuf>,
) -> Result<PathBuf, CdError> {
    if let Some(d) = dir {
        return Ok(PathBuf::from(d));
    }
    home_env.or_else(passwd).ok_or(CdError::NoHome)
}

/// `getpwuid_r` で現在のユーザーのホームディレクトリを引く。
fn home_from_passwd() -> Option<PathBuf> {
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0 as libc::c_char; 16 * 1024];
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    let rc = unsafe {
        libc::getpwuid_r(
            libc::getuid(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        )
    };
    if rc != 0 || result.is_null() || pwd.pw_dir.is_null() {
        return None;
    }
    let dir = unsafe { CStr::from_ptr(pwd.pw_dir) };
    Some(PathBuf::from(OsStr::from_bytes(dir.to_bytes())))
}
