//! boa glue: installs the host API into a fresh interpreter and evaluates one script.
//!
//! Functions here only convert between guest values and the typed capability APIs. Every host
//! function is wrapped so it checks the session token before and after doing any work.
//!
//! The session runs on its own thread, so the active [`SessionHost`] sits in a thread local for
//! the duration of [`evaluate`] and the registered functions capture nothing but a fn pointer.

use boa_engine::object::{FunctionObjectBuilder, ObjectInitializer};
use boa_engine::property::Attribute;
use boa_engine::{Context, JsError, JsNativeError, JsResult, JsString, JsValue, NativeFunction, Source};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use super::session::SessionHost;
use crate::capabilities::{encoding, CliOptions, CliResult};

type HostFn = fn(&SessionHost, &[JsValue], &mut Context) -> JsResult<JsValue>;

thread_local! {
    static ACTIVE: RefCell<Option<Arc<SessionHost>>> = const { RefCell::new(None) };
}

/// Binds a host to the current thread until dropped.
struct ActiveSession;

impl ActiveSession {
    fn enter(host: Arc<SessionHost>) -> Self {
        ACTIVE.with(|active| *active.borrow_mut() = Some(host));
        ActiveSession
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.borrow_mut().take());
    }
}

/// How a script evaluation ended, short of success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The interpreter could not be prepared.
    Setup(String),
    /// The script raised (or a checkpoint unwound it).
    Thrown(String),
}

/// Evaluate `text` in a new interpreter wired to `host`. Runs on the session thread.
pub fn evaluate(host: Arc<SessionHost>, text: &str) -> Result<(), ScriptError> {
    let _session = ActiveSession::enter(host);
    let mut ctx = Context::default();
    install(&mut ctx).map_err(|e| ScriptError::Setup(describe(e, &mut ctx)))?;
    match ctx.eval(Source::from_bytes(text)) {
        Ok(_) => Ok(()),
        Err(e) => Err(ScriptError::Thrown(describe(e, &mut ctx))),
    }
}

/// Register `getVar`, `cliCommand`, `console` and the `fs`, `http`, `clipboard` and
/// `encoding` namespaces.
fn install(ctx: &mut Context) -> JsResult<()> {
    global(ctx, "getVar", 1, get_var)?;
    global(ctx, "cliCommand", 3, cli_command)?;

    namespace(
        ctx,
        "console",
        &[
            (&["log"], 0, console_log),
            (&["error"], 0, console_error),
            (&["warn"], 0, console_warn),
        ],
    )?;

    namespace(
        ctx,
        "fs",
        &[
            (&["exists"], 1, fs_exists),
            (&["isFile"], 1, fs_is_file),
            (&["isDir"], 1, fs_is_dir),
            (&["info", "stat"], 1, fs_info),
            (&["readdir", "list"], 1, fs_list),
            (&["mkdir"], 1, fs_mkdir),
            (&["read", "readFile"], 1, fs_read),
            (&["write", "writeFile"], 2, fs_write),
            (&["append", "appendFile"], 2, fs_append),
            (&["copy"], 2, fs_copy),
            (&["move", "rename"], 2, fs_move),
            (&["remove", "delete", "rm"], 1, fs_remove),
            (&["join"], 1, fs_join),
            (&["split"], 1, fs_split),
            (&["abs", "absolute"], 1, fs_abs),
            (&["rel", "relative"], 2, fs_rel),
            (&["ext", "extname"], 1, fs_ext),
            (&["filename"], 1, fs_filename),
            (&["basename"], 1, fs_basename),
            (&["dirname"], 1, fs_dirname),
            (&["size"], 1, fs_size),
            (&["find", "search"], 2, fs_find),
            (&["cwd", "getcwd"], 0, fs_cwd),
            (&["chdir", "cd"], 1, fs_chdir),
        ],
    )?;

    namespace(
        ctx,
        "http",
        &[
            (&["get"], 2, http_get),
            (&["post"], 3, http_post),
            (&["getJSON"], 2, http_get_json),
            (&["downloadFile"], 3, http_download_file),
        ],
    )?;

    namespace(
        ctx,
        "clipboard",
        &[(&["read"], 0, clipboard_read), (&["write"], 1, clipboard_write)],
    )?;

    namespace(
        ctx,
        "encoding",
        &[
            (&["base64Encode"], 1, base64_encode),
            (&["base64Decode"], 1, base64_decode),
        ],
    )?;
    Ok(())
}

fn host_fn(f: HostFn) -> NativeFunction {
    NativeFunction::from_copy_closure(move |_this, args, ctx| call(f, args, ctx))
}

fn call(f: HostFn, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let host = ACTIVE
        .with(|active| active.borrow().clone())
        .ok_or_else(|| JsNativeError::error().with_message("no workflow session is active"))?;
    checkpoint(&host)?;
    let out = f(&host, args, ctx)?;
    checkpoint(&host)?;
    Ok(out)
}

/// Interruption is a runtime-limit error so `try`/`catch` in the script cannot swallow it.
fn checkpoint(host: &SessionHost) -> JsResult<()> {
    host.checkpoint()
        .map_err(|e| JsNativeError::runtime_limit().with_message(e.to_string()).into())
}

fn global(ctx: &mut Context, name: &str, length: usize, f: HostFn) -> JsResult<()> {
    let function = FunctionObjectBuilder::new(ctx.realm(), host_fn(f))
        .name(JsString::from(name))
        .length(length)
        .constructor(false)
        .build();
    ctx.register_global_property(JsString::from(name), function, Attribute::all())
}

fn namespace(
    ctx: &mut Context,
    name: &str,
    entries: &[(&[&str], usize, HostFn)],
) -> JsResult<()> {
    let mut init = ObjectInitializer::new(ctx);
    for (aliases, length, f) in entries {
        for alias in aliases.iter() {
            init.function(host_fn(*f), JsString::from(*alias), *length);
        }
    }
    let object = init.build();
    ctx.register_global_property(JsString::from(name), object, Attribute::all())
}

fn describe(err: JsError, ctx: &mut Context) -> String {
    match err.try_native(ctx) {
        Ok(native) => native.to_string(),
        Err(_) => err.to_string(),
    }
}

// Argument conversion.

fn arg(args: &[JsValue], i: usize) -> JsValue {
    args.get(i).cloned().unwrap_or_default()
}

/// String argument; `undefined` and `null` become `""`.
fn string_arg(args: &[JsValue], i: usize, ctx: &mut Context) -> JsResult<String> {
    let v = arg(args, i);
    if v.is_null_or_undefined() {
        return Ok(String::new());
    }
    Ok(v.to_string(ctx)?.to_std_string_escaped())
}

/// JSON view of an argument; `undefined` becomes `null`.
fn json_arg(args: &[JsValue], i: usize, ctx: &mut Context) -> JsResult<serde_json::Value> {
    let v = arg(args, i);
    if v.is_undefined() || v.is_callable() {
        return Ok(serde_json::Value::Null);
    }
    v.to_json(ctx)
}

fn json_to_string(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

fn string_list(v: serde_json::Value) -> Vec<String> {
    match v {
        serde_json::Value::Array(items) => items.into_iter().map(json_to_string).collect(),
        serde_json::Value::Null => Vec::new(),
        other => vec![json_to_string(other)],
    }
}

fn headers_arg(args: &[JsValue], i: usize, ctx: &mut Context) -> JsResult<HashMap<String, String>> {
    Ok(match json_arg(args, i, ctx)? {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, json_to_string(v)))
            .collect(),
        _ => HashMap::new(),
    })
}

fn to_js<T: Serialize>(value: &T, ctx: &mut Context) -> JsResult<JsValue> {
    let json = serde_json::to_value(value)
        .map_err(|e| JsNativeError::typ().with_message(format!("cannot convert result: {}", e)))?;
    JsValue::from_json(&json, ctx)
}

fn js_string(s: impl AsRef<str>) -> JsValue {
    JsValue::from(JsString::from(s.as_ref()))
}

/// Console rendering: strings as-is, objects as JSON, everything else via its display form.
fn console_line(args: &[JsValue], ctx: &mut Context) -> String {
    let mut parts = Vec::with_capacity(args.len());
    for v in args {
        let part = if let Some(s) = v.as_string() {
            s.to_std_string_escaped()
        } else if v.is_object() && !v.is_callable() {
            match v.to_json(ctx) {
                Ok(json) => json.to_string(),
                Err(_) => v.display().to_string(),
            }
        } else {
            v.display().to_string()
        };
        parts.push(part);
    }
    parts.join(" ")
}

// Globals.

fn get_var(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let key = string_arg(args, 0, ctx)?;
    Ok(js_string(crate::capabilities::globals::get_var(&host.vars, &key)))
}

fn cli_command(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let name = string_arg(args, 0, ctx)?;
    let argv = string_list(json_arg(args, 1, ctx)?);
    let result = match CliOptions::from_value(json_arg(args, 2, ctx)?) {
        Ok(options) => host.cli.run(&name, &argv, &options),
        Err(e) => CliResult::failed(e),
    };
    to_js(&result, ctx)
}

fn console_log(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    host.console.log(&console_line(args, ctx));
    Ok(JsValue::undefined())
}

fn console_error(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    host.console.error(&console_line(args, ctx));
    Ok(JsValue::undefined())
}

fn console_warn(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    host.console.warn(&console_line(args, ctx));
    Ok(JsValue::undefined())
}

// fs

fn fs_exists(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsValue::from(host.fs.exists(&string_arg(args, 0, ctx)?)))
}

fn fs_is_file(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsValue::from(host.fs.is_file(&string_arg(args, 0, ctx)?)))
}

fn fs_is_dir(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsValue::from(host.fs.is_dir(&string_arg(args, 0, ctx)?)))
}

fn fs_info(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let res = host.fs.info(&string_arg(args, 0, ctx)?);
    to_js(&res, ctx)
}

fn fs_list(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let res = host.fs.list(&string_arg(args, 0, ctx)?);
    to_js(&res, ctx)
}

fn fs_mkdir(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let res = host.fs.mkdir(&string_arg(args, 0, ctx)?);
    to_js(&res, ctx)
}

fn fs_read(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let res = host.fs.read(&string_arg(args, 0, ctx)?);
    to_js(&res, ctx)
}

fn fs_write(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, ctx)?;
    let content = string_arg(args, 1, ctx)?;
    to_js(&host.fs.write(&path, &content), ctx)
}

fn fs_append(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = string_arg(args, 0, ctx)?;
    let content = string_arg(args, 1, ctx)?;
    to_js(&host.fs.append(&path, &content), ctx)
}

fn fs_copy(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let src = string_arg(args, 0, ctx)?;
    let dst = string_arg(args, 1, ctx)?;
    to_js(&host.fs.copy(&src, &dst), ctx)
}

fn fs_move(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let src = string_arg(args, 0, ctx)?;
    let dst = string_arg(args, 1, ctx)?;
    to_js(&host.fs.move_path(&src, &dst), ctx)
}

fn fs_remove(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let res = host.fs.remove(&string_arg(args, 0, ctx)?);
    to_js(&res, ctx)
}

/// Accepts either an array of segments or the segments as separate arguments.
fn fs_join(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let mut elements = Vec::new();
    for i in 0..args.len() {
        elements.extend(string_list(json_arg(args, i, ctx)?));
    }
    Ok(js_string(host.fs.join(&elements)))
}

fn fs_split(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let res = host.fs.split(&string_arg(args, 0, ctx)?);
    to_js(&res, ctx)
}

fn fs_abs(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let res = host.fs.abs(&string_arg(args, 0, ctx)?);
    to_js(&res, ctx)
}

fn fs_rel(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let base = string_arg(args, 0, ctx)?;
    let target = string_arg(args, 1, ctx)?;
    to_js(&host.fs.rel(&base, &target), ctx)
}

fn fs_ext(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    Ok(js_string(host.fs.ext(&string_arg(args, 0, ctx)?)))
}

fn fs_filename(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    Ok(js_string(host.fs.filename(&string_arg(args, 0, ctx)?)))
}

fn fs_basename(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    Ok(js_string(host.fs.basename(&string_arg(args, 0, ctx)?)))
}

fn fs_dirname(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    Ok(js_string(host.fs.dirname(&string_arg(args, 0, ctx)?)))
}

fn fs_size(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let res = host.fs.size(&string_arg(args, 0, ctx)?);
    to_js(&res, ctx)
}

fn fs_find(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let root = string_arg(args, 0, ctx)?;
    let pattern = string_arg(args, 1, ctx)?;
    to_js(&host.fs.find(&root, &pattern), ctx)
}

fn fs_cwd(host: &SessionHost, _args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    to_js(&host.fs.cwd(), ctx)
}

fn fs_chdir(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let res = host.fs.chdir(&string_arg(args, 0, ctx)?);
    to_js(&res, ctx)
}

// http

fn http_get(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let url = string_arg(args, 0, ctx)?;
    let headers = headers_arg(args, 1, ctx)?;
    to_js(&host.net.get(&url, &headers), ctx)
}

/// A non-string body is sent as its JSON encoding.
fn http_post(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let url = string_arg(args, 0, ctx)?;
    let body = match json_arg(args, 1, ctx)? {
        serde_json::Value::Null => String::new(),
        v => json_to_string(v),
    };
    let headers = headers_arg(args, 2, ctx)?;
    to_js(&host.net.post(&url, body, &headers), ctx)
}

fn http_get_json(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let url = string_arg(args, 0, ctx)?;
    let headers = headers_arg(args, 1, ctx)?;
    to_js(&host.net.get_json(&url, &headers), ctx)
}

fn http_download_file(
    host: &SessionHost,
    args: &[JsValue],
    ctx: &mut Context,
) -> JsResult<JsValue> {
    let url = string_arg(args, 0, ctx)?;
    let output = string_arg(args, 1, ctx)?;
    let show_progress = json_arg(args, 2, ctx)?
        .get("show_progress")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    to_js(&host.net.download_file(&url, &output, show_progress), ctx)
}

// clipboard

fn clipboard_read(host: &SessionHost, _args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    to_js(&host.clipboard.read(), ctx)
}

fn clipboard_write(host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let text = string_arg(args, 0, ctx)?;
    to_js(&host.clipboard.write(&text), ctx)
}

// encoding

fn base64_encode(_host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    Ok(js_string(encoding::base64_encode(&string_arg(args, 0, ctx)?)))
}

fn base64_decode(_host: &SessionHost, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let res = encoding::base64_decode(&string_arg(args, 0, ctx)?);
    to_js(&res, ctx)
}
