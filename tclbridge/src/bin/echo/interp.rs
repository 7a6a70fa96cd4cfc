//! A small Tcl interpreter.
//!
//! Covers the subset of the language the bridge generates and the tests
//! exercise: word parsing with brace, quote, backslash, variable and command
//! substitution, `{*}` expansion, procs, namespaces, arrays, lists, dicts and
//! a numeric `expr`. Errors use the same message text as `tclsh` where the
//! host is likely to look at it.

use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Write};
use std::rc::Rc;

use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tclbridge::value::{Number, Value, format_float, parse_bool, parse_dict, parse_list, parse_number, to_text};
use tclbridge_proto::{Cipher, Endpoint, Key, Message, OpCode};

/// Reported by `info patchlevel`.
const PATCHLEVEL: &str = "8.6.13";

/// Nested `eval` limit.
const MAX_DEPTH: usize = 1000;

/// Non-normal completion of a script.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// `error`, or any failing command.
    Error(String),
    /// `return`.
    Return(String),
    /// `break`.
    Break,
    /// `continue`.
    Continue,
    /// `exit`, or the host went away.
    Exit(i32),
}

/// Result of evaluating a command or script.
pub type Outcome = Result<String, Flow>;

/// Shorthand for [`Flow::Error`].
fn error(message: impl Into<String>) -> Flow {
    Flow::Error(message.into())
}

/// `wrong # args` error for `words[0]`.
fn usage(words: &[String], rest: &str) -> Flow {
    let name = words.first().map_or("", String::as_str);
    error(format!("wrong # args: should be \"{name} {rest}\""))
}

/// Canonical list text of `items`.
fn list_text<S: AsRef<str>>(items: &[S]) -> String {
    to_text(&Value::List(
        items.iter().map(|s| Value::from(s.as_ref())).collect(),
    ))
}

/// Canonical dict text of `map`.
fn dict_text(map: &IndexMap<String, String>) -> String {
    to_text(&Value::Dict(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::from(v)))
            .collect(),
    ))
}

/// Parses `text` as a list, as a Tcl error on failure.
fn list_of(text: &str) -> Result<Vec<String>, Flow> {
    parse_list(text).map_err(|e| error(e.to_string()))
}

/// Parses `text` as a dict, as a Tcl error on failure.
fn dict_of(text: &str) -> Result<IndexMap<String, String>, Flow> {
    parse_dict(text).map_err(|_| error("missing value to go with key"))
}

/// Parses an integer argument.
fn int_of(text: &str) -> Result<i64, Flow> {
    parse_number(text)
        .ok()
        .and_then(Number::to_i64)
        .ok_or_else(|| error(format!("expected integer but got \"{text}\"")))
}

/// Resolves a list index (`3`, `end`, `end-1`) against `len`.
fn list_index(spec: &str, len: usize) -> Result<i64, Flow> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let spec = spec.trim();
    if let Some(rest) = spec.strip_prefix("end") {
        let offset = match rest.chars().next() {
            None => 0,
            Some('-') => -int_of(&rest[1..])?,
            Some('+') => int_of(&rest[1..])?,
            _ => return Err(error(format!("bad index \"{spec}\""))),
        };
        return Ok(len - 1 + offset);
    }
    int_of(spec).map_err(|_| error(format!("bad index \"{spec}\": must be integer?[+-]integer? or end?[+-]integer?")))
}

/// Clamps a resolved index into `0..=len`.
fn clamp(index: i64, len: usize) -> usize {
    usize::try_from(index.max(0)).map_or(len, |i| i.min(len))
}

/// `*` / `?` glob match.
fn glob(pattern: &str, text: &str) -> bool {
    /// Matches over char slices.
    fn matches(p: &[char], t: &[char]) -> bool {
        match p.split_first() {
            None => t.is_empty(),
            Some(('*', rest)) => (0..=t.len()).any(|i| matches(rest, &t[i..])),
            Some(('?', rest)) => !t.is_empty() && matches(rest, &t[1..]),
            Some(('\\', rest)) if !rest.is_empty() => {
                t.first() == rest.first() && matches(&rest[1..], &t[1..])
            }
            Some((c, rest)) => t.first() == Some(c) && matches(rest, &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    matches(&p, &t)
}

/// Fully qualifies `name` relative to namespace `ns`.
fn qualify(name: &str, ns: &str) -> String {
    if let Some(rest) = name.strip_prefix("::") {
        format!("::{}", rest.trim_start_matches(':'))
    } else if ns == "::" {
        format!("::{name}")
    } else {
        format!("{ns}::{name}")
    }
}

/// Splits a qualified name into its namespace and tail.
fn parent_of(qualified: &str) -> (&str, &str) {
    match qualified.rsplit_once("::") {
        Some(("", tail)) => ("::", tail),
        Some((parent, tail)) => (parent, tail),
        None => ("::", qualified),
    }
}

/// Splits `name(key)` into base name and element key.
fn split_var(name: &str) -> (&str, Option<&str>) {
    if let Some(open) = name.find('(') {
        if let Some(inner) = name[open + 1..].strip_suffix(')') {
            return (&name[..open], Some(inner));
        }
    }
    (name, None)
}

/// Character cursor over script text.
#[derive(Debug)]
struct Cursor {
    /// Script characters.
    chars: Vec<char>,
    /// Current position.
    pos: usize,
}

impl Cursor {
    /// Starts at the beginning of `text`.
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    /// Current character.
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Character `n` places ahead.
    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    /// Consumes one character.
    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// Whether the text at the cursor starts with `s`.
    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    /// Skips spaces and tabs.
    fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.pos += 1;
        }
    }
}

/// Where a substituted run of text stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Until {
    /// Whitespace or a command separator.
    WordEnd,
    /// A closing double quote.
    Quote,
    /// A closing parenthesis (array index).
    Paren,
}

/// Reads a `{...}` word; the cursor is on the opening brace.
fn braced(cur: &mut Cursor) -> Outcome {
    cur.pos += 1;
    let mut depth = 1;
    let mut out = String::new();
    while let Some(c) = cur.bump() {
        match c {
            '\\' => match cur.bump() {
                Some('\n') => {
                    out.push(' ');
                    cur.skip_blanks();
                }
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            '{' => {
                depth += 1;
                out.push(c);
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(out);
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    Err(error("missing close-brace"))
}

/// Reads the script inside `[...]`; the cursor is just past the `[`.
fn bracketed(cur: &mut Cursor) -> Outcome {
    let start = cur.pos;
    let mut depth = 1;
    let mut braces = 0usize;
    while let Some(c) = cur.bump() {
        match c {
            '\\' => {
                cur.bump();
            }
            '{' => braces += 1,
            '}' if braces > 0 => braces -= 1,
            '[' if braces == 0 => depth += 1,
            ']' if braces == 0 => {
                depth -= 1;
                if depth == 0 {
                    return Ok(cur.chars[start..cur.pos - 1].iter().collect());
                }
            }
            _ => {}
        }
    }
    Err(error("missing close-bracket"))
}

/// Reads up to `max` hex digits.
fn hex_digits(cur: &mut Cursor, max: usize) -> Option<u32> {
    let mut value = None;
    for _ in 0..max {
        let Some(d) = cur.peek().and_then(|c| c.to_digit(16)) else {
            break;
        };
        value = Some(value.unwrap_or(0) * 16 + d);
        cur.pos += 1;
    }
    value
}

/// Applies one backslash escape; the cursor is just past the backslash.
fn backslash(cur: &mut Cursor, out: &mut String) {
    let Some(c) = cur.bump() else {
        out.push('\\');
        return;
    };
    let simple = match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        'r' => Some('\r'),
        'a' => Some('\x07'),
        'b' => Some('\x08'),
        'f' => Some('\x0c'),
        'v' => Some('\x0b'),
        _ => None,
    };
    if let Some(ch) = simple {
        out.push(ch);
        return;
    }
    match c {
        '\n' => {
            out.push(' ');
            cur.skip_blanks();
        }
        'x' | 'u' | 'U' => {
            let max = match c {
                'x' => 2,
                'u' => 4,
                _ => 8,
            };
            match hex_digits(cur, max) {
                Some(code) => out.push(char::from_u32(code).unwrap_or('\u{fffd}')),
                None => out.push(c),
            }
        }
        '0'..='7' => {
            let mut code = c.to_digit(8).unwrap_or(0);
            for _ in 0..2 {
                match cur.peek().and_then(|d| d.to_digit(8)) {
                    Some(d) => {
                        code = code * 8 + d;
                        cur.pos += 1;
                    }
                    None => break,
                }
            }
            out.push(char::from_u32(code & 0xff).unwrap_or('\u{fffd}'));
        }
        other => out.push(other),
    }
}

/// A variable's storage.
#[derive(Debug, Clone)]
enum Var {
    /// Plain string.
    Scalar(String),
    /// Associative array.
    Array(IndexMap<String, String>),
}

/// A user-defined procedure.
#[derive(Debug)]
struct Proc {
    /// Parameter names with optional defaults.
    params: Vec<(String, Option<String>)>,
    /// Body script.
    body: String,
    /// Namespace the body runs in.
    ns: String,
}

/// Native command implementation.
type Builtin = fn(&mut Interp, &[String]) -> Outcome;

/// A command table entry.
#[derive(Debug, Clone)]
enum Command {
    /// Implemented in Rust.
    Builtin(Builtin),
    /// Defined with `proc`.
    Proc(Rc<Proc>),
}

/// One level of the call stack.
#[derive(Debug)]
struct Scope {
    /// Procedure locals; `None` at namespace level.
    locals: Option<HashMap<String, Var>>,
    /// Current namespace.
    ns: String,
}

impl Scope {
    /// Global level.
    fn global() -> Self {
        Self {
            locals: None,
            ns: "::".to_owned(),
        }
    }
}

/// The host connection.
pub struct Peer {
    /// Framed, optionally encrypted channel.
    endpoint: Endpoint<Box<dyn Read>, Box<dyn Write>>,
    /// IV and padding source.
    rng: StdRng,
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("encrypted", &self.endpoint.cipher().is_some())
            .finish_non_exhaustive()
    }
}

impl Peer {
    /// Wraps a connected channel; `seed` initialises the pad generator.
    pub fn new(endpoint: Endpoint<Box<dyn Read>, Box<dyn Write>>, seed: u64) -> Self {
        Self {
            endpoint,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

/// Parses a hex seed; anything unparsable seeds with zero.
pub fn parse_seed(text: &str) -> u64 {
    u64::from_str_radix(text.trim(), 16).unwrap_or(0)
}

/// Interpreter state.
#[derive(Debug)]
pub struct Interp {
    /// Commands by qualified name.
    commands: HashMap<String, Command>,
    /// Namespace variables by qualified name.
    globals: HashMap<String, Var>,
    /// Existing namespaces, `::` included.
    namespaces: BTreeSet<String>,
    /// Call stack; never empty.
    scopes: Vec<Scope>,
    /// Host connection, when serving.
    peer: Option<Peer>,
    /// Current `eval` nesting.
    depth: usize,
}

impl Interp {
    /// A fresh interpreter with the built-in commands.
    pub fn new() -> Self {
        let mut it = Self {
            commands: HashMap::new(),
            globals: HashMap::new(),
            namespaces: ["::", "::tclbridge"].into_iter().map(String::from).collect(),
            scopes: vec![Scope::global()],
            peer: None,
            depth: 0,
        };
        let builtins: &[(&str, Builtin)] = &[
            ("set", cmd_set),
            ("unset", cmd_unset),
            ("proc", cmd_proc),
            ("return", cmd_return),
            ("break", |_, _| Err(Flow::Break)),
            ("continue", |_, _| Err(Flow::Continue)),
            ("error", cmd_error),
            ("rename", cmd_rename),
            ("list", |_, w| Ok(list_text(&w[1..]))),
            ("lindex", cmd_lindex),
            ("llength", cmd_llength),
            ("lrange", cmd_lrange),
            ("lreplace", cmd_lreplace),
            ("linsert", cmd_linsert),
            ("lappend", cmd_lappend),
            ("concat", cmd_concat),
            ("join", cmd_join),
            ("incr", cmd_incr),
            ("puts", cmd_puts),
            ("exit", cmd_exit),
            ("dict", cmd_dict),
            ("namespace", cmd_namespace),
            ("info", cmd_info),
            ("array", cmd_array),
            ("string", cmd_string),
            ("source", cmd_source),
            ("cd", cmd_cd),
            ("pwd", cmd_pwd),
            ("catch", cmd_catch),
            ("if", cmd_if),
            ("foreach", cmd_foreach),
            ("while", cmd_while),
            ("expr", cmd_expr),
            ("tclbridge::invoke", cmd_invoke),
            ("tclbridge::rekey", cmd_rekey),
            ("tclbridge::rename_callback", cmd_rename_callback),
        ];
        for (name, f) in builtins {
            it.commands
                .insert(qualify(name, "::"), Command::Builtin(*f));
        }
        it
    }

    /// Attaches the host connection.
    pub fn attach(&mut self, peer: Peer) {
        self.peer = Some(peer);
    }

    /// Evaluates a script in the current scope.
    pub fn eval(&mut self, script: &str) -> Outcome {
        if self.depth >= MAX_DEPTH {
            return Err(error("too many nested evaluations (infinite loop?)"));
        }
        self.depth += 1;
        let mut cur = Cursor::new(script);
        let result = self.eval_cursor(&mut cur);
        self.depth -= 1;
        result
    }

    /// Evaluates every command from the cursor on.
    fn eval_cursor(&mut self, cur: &mut Cursor) -> Outcome {
        let mut result = String::new();
        while let Some(words) = self.parse_command(cur)? {
            if !words.is_empty() {
                result = self.invoke(&words)?;
            }
        }
        Ok(result)
    }

    /// Parses and substitutes the next command's words; `None` at the end.
    fn parse_command(&mut self, cur: &mut Cursor) -> Result<Option<Vec<String>>, Flow> {
        loop {
            match cur.peek() {
                None => return Ok(None),
                Some(c) if c.is_whitespace() || c == ';' => cur.pos += 1,
                Some('\\') if cur.peek_at(1) == Some('\n') => cur.pos += 2,
                Some('#') => {
                    while let Some(c) = cur.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some(_) => break,
            }
        }
        let mut words = Vec::new();
        loop {
            loop {
                match cur.peek() {
                    Some(' ' | '\t' | '\r') => cur.pos += 1,
                    Some('\\') if cur.peek_at(1) == Some('\n') => cur.pos += 2,
                    _ => break,
                }
            }
            match cur.peek() {
                None => return Ok(Some(words)),
                Some('\n' | ';') => {
                    cur.pos += 1;
                    return Ok(Some(words));
                }
                _ => {}
            }
            let expand = cur.starts_with("{*}")
                && !matches!(cur.peek_at(3), None | Some(' ' | '\t' | '\r' | '\n' | ';'));
            if expand {
                cur.pos += 3;
                let word = self.parse_word(cur)?;
                words.extend(list_of(&word)?);
            } else {
                words.push(self.parse_word(cur)?);
            }
        }
    }

    /// Parses one word.
    fn parse_word(&mut self, cur: &mut Cursor) -> Outcome {
        let (word, what) = match cur.peek() {
            Some('{') => (braced(cur)?, "close-brace"),
            Some('"') => {
                cur.pos += 1;
                (self.subst_until(cur, Until::Quote)?, "close-quote")
            }
            _ => return self.subst_until(cur, Until::WordEnd),
        };
        match cur.peek() {
            None | Some(' ' | '\t' | '\r' | '\n' | ';') => Ok(word),
            Some('\\') if cur.peek_at(1) == Some('\n') => Ok(word),
            _ => Err(error(format!("extra characters after {what}"))),
        }
    }

    /// Substitutes text up to `until`.
    fn subst_until(&mut self, cur: &mut Cursor, until: Until) -> Outcome {
        let mut out = String::new();
        loop {
            let Some(c) = cur.peek() else {
                return match until {
                    Until::WordEnd => Ok(out),
                    Until::Quote => Err(error("missing \"")),
                    Until::Paren => Err(error("missing )")),
                };
            };
            match c {
                '"' if until == Until::Quote => {
                    cur.pos += 1;
                    return Ok(out);
                }
                ')' if until == Until::Paren => {
                    cur.pos += 1;
                    return Ok(out);
                }
                ' ' | '\t' | '\r' | '\n' | ';' if until == Until::WordEnd => return Ok(out),
                '\\' if until == Until::WordEnd && cur.peek_at(1) == Some('\n') => return Ok(out),
                '\\' => {
                    cur.pos += 1;
                    backslash(cur, &mut out);
                }
                '$' => {
                    cur.pos += 1;
                    self.subst_var(cur, &mut out)?;
                }
                '[' => {
                    cur.pos += 1;
                    let script = bracketed(cur)?;
                    out.push_str(&self.eval(&script)?);
                }
                _ => {
                    out.push(c);
                    cur.pos += 1;
                }
            }
        }
    }

    /// Substitutes a variable reference; the cursor is just past the `$`.
    fn subst_var(&mut self, cur: &mut Cursor, out: &mut String) -> Result<(), Flow> {
        let name = if cur.peek() == Some('{') {
            cur.pos += 1;
            let mut name = String::new();
            loop {
                match cur.bump() {
                    Some('}') => break,
                    Some(c) => name.push(c),
                    None => return Err(error("missing close-brace for variable name")),
                }
            }
            name
        } else {
            let mut name = String::new();
            loop {
                match cur.peek() {
                    Some(c) if c.is_alphanumeric() || c == '_' => {
                        name.push(c);
                        cur.pos += 1;
                    }
                    Some(':') if cur.peek_at(1) == Some(':') => {
                        name.push_str("::");
                        cur.pos += 2;
                        while cur.peek() == Some(':') {
                            cur.pos += 1;
                        }
                    }
                    _ => break,
                }
            }
            if name.is_empty() {
                out.push('$');
                return Ok(());
            }
            if cur.peek() == Some('(') {
                cur.pos += 1;
                let key = self.subst_until(cur, Until::Paren)?;
                name = format!("{name}({key})");
            }
            name
        };
        out.push_str(&self.get_var(&name)?);
        Ok(())
    }

    /// Runs one command.
    fn invoke(&mut self, words: &[String]) -> Outcome {
        let Some((qualified, command)) = self.lookup(&words[0]) else {
            return Err(error(format!("invalid command name \"{}\"", words[0])));
        };
        match command {
            Command::Builtin(f) => f(self, words),
            Command::Proc(proc) => self.call_proc(&qualified, &proc, words),
        }
    }

    /// Current namespace.
    fn current_ns(&self) -> &str {
        self.scopes.last().map_or("::", |s| s.ns.as_str())
    }

    /// Finds a command: current namespace first, then global.
    fn lookup(&self, name: &str) -> Option<(String, Command)> {
        let primary = qualify(name, self.current_ns());
        if let Some(c) = self.commands.get(&primary) {
            return Some((primary, c.clone()));
        }
        if name.starts_with("::") {
            return None;
        }
        let global = qualify(name, "::");
        self.commands.get(&global).map(|c| (global, c.clone()))
    }

    /// Binds arguments and runs a procedure body.
    fn call_proc(&mut self, name: &str, proc: &Proc, words: &[String]) -> Outcome {
        let args = &words[1..];
        let mut locals = HashMap::new();
        let mut next = 0;
        for (i, (param, default)) in proc.params.iter().enumerate() {
            if param == "args" && i + 1 == proc.params.len() {
                locals.insert(
                    param.clone(),
                    Var::Scalar(list_text(&args[next.min(args.len())..])),
                );
                next = args.len();
            } else if let Some(arg) = args.get(next) {
                locals.insert(param.clone(), Var::Scalar(arg.clone()));
                next += 1;
            } else if let Some(default) = default {
                locals.insert(param.clone(), Var::Scalar(default.clone()));
            } else {
                return Err(proc_usage(name, proc));
            }
        }
        if next < args.len() {
            return Err(proc_usage(name, proc));
        }

        self.scopes.push(Scope {
            locals: Some(locals),
            ns: proc.ns.clone(),
        });
        let result = self.eval(&proc.body);
        self.scopes.pop();
        match result {
            Ok(v) | Err(Flow::Return(v)) => Ok(v),
            Err(Flow::Break) => Err(error("invoked \"break\" outside of a loop")),
            Err(Flow::Continue) => Err(error("invoked \"continue\" outside of a loop")),
            Err(other) => Err(other),
        }
    }

    /// The table holding variable `base` and its key there.
    fn table(&mut self, base: &str) -> (&mut HashMap<String, Var>, String) {
        let ns = self.current_ns().to_owned();
        if !base.contains("::") {
            if let Some(locals) = self.scopes.last_mut().and_then(|s| s.locals.as_mut()) {
                return (locals, base.to_owned());
            }
        }
        (&mut self.globals, qualify(base, &ns))
    }

    /// Reads a variable or array element.
    fn get_var(&mut self, name: &str) -> Outcome {
        let (base, key) = split_var(name);
        let (table, slot) = self.table(base);
        match (table.get(&slot), key) {
            (Some(Var::Scalar(v)), None) => Ok(v.clone()),
            (Some(Var::Array(a)), Some(k)) => a.get(k).cloned().ok_or_else(|| {
                error(format!("can't read \"{name}\": no such element in array"))
            }),
            (Some(Var::Array(_)), None) => {
                Err(error(format!("can't read \"{name}\": variable is array")))
            }
            (Some(Var::Scalar(_)), Some(_)) => {
                Err(error(format!("can't read \"{name}\": variable isn't array")))
            }
            (None, _) => Err(error(format!("can't read \"{name}\": no such variable"))),
        }
    }

    /// Writes a variable or array element.
    fn set_var(&mut self, name: &str, value: String) -> Outcome {
        let (base, key) = split_var(name);
        let (table, slot) = self.table(base);
        match key {
            None => {
                if matches!(table.get(&slot), Some(Var::Array(_))) {
                    return Err(error(format!("can't set \"{name}\": variable is array")));
                }
                table.insert(slot, Var::Scalar(value.clone()));
                Ok(value)
            }
            Some(k) => match table
                .entry(slot)
                .or_insert_with(|| Var::Array(IndexMap::new()))
            {
                Var::Array(a) => {
                    a.insert(k.to_owned(), value.clone());
                    Ok(value)
                }
                Var::Scalar(_) => Err(error(format!(
                    "can't set \"{name}\": variable isn't array"
                ))),
            },
        }
    }

    /// Removes a variable or element; `false` if it did not exist.
    fn unset_var(&mut self, name: &str) -> bool {
        let (base, key) = split_var(name);
        let (table, slot) = self.table(base);
        match key {
            None => table.remove(&slot).is_some(),
            Some(k) => match table.get_mut(&slot) {
                Some(Var::Array(a)) => a.shift_remove(k).is_some(),
                _ => false,
            },
        }
    }

    /// Whether a variable or element exists.
    fn var_exists(&mut self, name: &str) -> bool {
        let (base, key) = split_var(name);
        let (table, slot) = self.table(base);
        match (table.get(&slot), key) {
            (Some(_), None) => true,
            (Some(Var::Array(a)), Some(k)) => a.contains_key(k),
            _ => false,
        }
    }

    /// The array named `name`, if it is one.
    fn array_mut(&mut self, name: &str) -> Option<&mut IndexMap<String, String>> {
        let (table, slot) = self.table(name);
        match table.get_mut(&slot) {
            Some(Var::Array(a)) => Some(a),
            _ => None,
        }
    }

    /// Creates `ns` and its parents.
    fn create_namespace(&mut self, ns: &str) {
        let mut current = ns;
        while current != "::" && self.namespaces.insert(current.to_owned()) {
            current = parent_of(current).0;
        }
    }

    /// Evaluates at global level, restoring the call stack afterwards.
    fn eval_global(&mut self, script: &str) -> Outcome {
        let saved = std::mem::replace(&mut self.scopes, vec![Scope::global()]);
        let outcome = self.eval(script);
        self.scopes = saved;
        outcome
    }

    /// Sends one message to the host.
    fn send(&mut self, msg: &Message) -> Result<(), Flow> {
        let peer = self.peer.as_mut().ok_or_else(|| error("not connected to a host"))?;
        peer.endpoint
            .send_with(msg, &mut peer.rng)
            .map_err(|e| error(format!("send failed: {e}")))
    }

    /// Receives one message; host EOF is an exit.
    fn receive(&mut self) -> Result<Message, Flow> {
        let peer = self.peer.as_mut().ok_or_else(|| error("not connected to a host"))?;
        match peer.endpoint.receive() {
            Ok(msg) => Ok(msg),
            Err(e) if e.is_eof() => Err(Flow::Exit(0)),
            Err(e) => Err(error(format!("receive failed: {e}"))),
        }
    }

    /// Evaluates a host request and sends the reply.
    fn serve(&mut self, body: &str) -> Result<(), Flow> {
        let reply = match self.eval_global(body) {
            Ok(v) | Err(Flow::Return(v)) => Message::ret(v),
            Err(Flow::Error(m)) => Message::error(m),
            Err(Flow::Break | Flow::Continue) => Message::ret(""),
            Err(Flow::Exit(code)) => return Err(Flow::Exit(code)),
        };
        self.send(&reply)
    }

    /// Serves host requests until the host leaves or `exit` runs. Returns
    /// the process exit code.
    pub fn run(&mut self) -> i32 {
        loop {
            let outcome = match self.receive() {
                Ok(msg) => match msg.op {
                    OpCode::Call => self.serve(&msg.body),
                    OpCode::Close | OpCode::Exit => return 0,
                    other => self.send(&Message::error(format!("unexpected {other} message"))),
                },
                Err(flow) => Err(flow),
            };
            match outcome {
                Ok(()) => {}
                Err(Flow::Exit(code)) => {
                    let _ = self.send(&Message::new(OpCode::Close, code.to_string()));
                    return code;
                }
                Err(other) => {
                    eprintln!("[tclbridge-echo] {other:?}");
                    return 1;
                }
            }
        }
    }
}

/// `wrong # args` for a procedure.
fn proc_usage(name: &str, proc: &Proc) -> Flow {
    let mut parts = vec![name.trim_start_matches("::").to_owned()];
    for (i, (param, default)) in proc.params.iter().enumerate() {
        if param == "args" && i + 1 == proc.params.len() {
            parts.push("?arg ...?".to_owned());
        } else if default.is_some() {
            parts.push(format!("?{param}?"));
        } else {
            parts.push(param.clone());
        }
    }
    error(format!("wrong # args: should be \"{}\"", parts.join(" ")))
}

/// `set varName ?newValue?`
fn cmd_set(it: &mut Interp, w: &[String]) -> Outcome {
    match w.len() {
        2 => it.get_var(&w[1]),
        3 => it.set_var(&w[1], w[2].clone()),
        _ => Err(usage(w, "varName ?newValue?")),
    }
}

/// `unset ?-nocomplain? ?--? ?name ...?`
fn cmd_unset(it: &mut Interp, w: &[String]) -> Outcome {
    let mut names = &w[1..];
    let mut nocomplain = false;
    while let Some(flag) = names.first() {
        match flag.as_str() {
            "-nocomplain" => nocomplain = true,
            "--" => {
                names = &names[1..];
                break;
            }
            _ => break,
        }
        names = &names[1..];
    }
    for name in names {
        if !it.unset_var(name) && !nocomplain {
            return Err(error(format!("can't unset \"{name}\": no such variable")));
        }
    }
    Ok(String::new())
}

/// `proc name args body`
fn cmd_proc(it: &mut Interp, w: &[String]) -> Outcome {
    let [_, name, params, body] = w else {
        return Err(usage(w, "name args body"));
    };
    let qualified = qualify(name, it.current_ns());
    let ns = parent_of(&qualified).0.to_owned();
    if !it.namespaces.contains(&ns) {
        return Err(error(format!(
            "can't create procedure \"{name}\": unknown namespace"
        )));
    }
    let mut parsed = Vec::new();
    for param in list_of(params)? {
        let mut parts = list_of(&param)?.into_iter();
        let Some(pname) = parts.next() else {
            return Err(error("argument with no name"));
        };
        parsed.push((pname, parts.next()));
    }
    let proc = Proc {
        params: parsed,
        body: body.clone(),
        ns,
    };
    it.commands.insert(qualified, Command::Proc(Rc::new(proc)));
    Ok(String::new())
}

/// `return ?value?`
fn cmd_return(_: &mut Interp, w: &[String]) -> Outcome {
    Err(Flow::Return(w.get(1).cloned().unwrap_or_default()))
}

/// `error message`
fn cmd_error(_: &mut Interp, w: &[String]) -> Outcome {
    match w.get(1) {
        Some(message) => Err(error(message.clone())),
        None => Err(usage(w, "message ?errorInfo? ?errorCode?")),
    }
}

/// `rename oldName newName`
fn cmd_rename(it: &mut Interp, w: &[String]) -> Outcome {
    let [_, old, new] = w else {
        return Err(usage(w, "oldName newName"));
    };
    let Some((qualified, command)) = it.lookup(old) else {
        return Err(error(format!(
            "can't rename \"{old}\": command doesn't exist"
        )));
    };
    it.commands.remove(&qualified);
    if !new.is_empty() {
        it.commands.insert(qualify(new, it.current_ns()), command);
    }
    Ok(String::new())
}

/// `lindex list ?index?`
fn cmd_lindex(_: &mut Interp, w: &[String]) -> Outcome {
    match w.len() {
        2 => Ok(w[1].clone()),
        3 => {
            let items = list_of(&w[1])?;
            let i = list_index(&w[2], items.len())?;
            Ok(usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default())
        }
        _ => Err(usage(w, "list ?index ...?")),
    }
}

/// `llength list`
fn cmd_llength(_: &mut Interp, w: &[String]) -> Outcome {
    match w {
        [_, list] => Ok(list_of(list)?.len().to_string()),
        _ => Err(usage(w, "list")),
    }
}

/// `lrange list first last`
fn cmd_lrange(_: &mut Interp, w: &[String]) -> Outcome {
    let [_, list, first, last] = w else {
        return Err(usage(w, "list first last"));
    };
    let items = list_of(list)?;
    let first = clamp(list_index(first, items.len())?, items.len());
    let last = list_index(last, items.len())?;
    if last < 0 {
        return Ok(String::new());
    }
    let end = clamp(last + 1, items.len());
    if first >= end {
        return Ok(String::new());
    }
    Ok(list_text(&items[first..end]))
}

/// `lreplace list first last ?element ...?`
fn cmd_lreplace(_: &mut Interp, w: &[String]) -> Outcome {
    if w.len() < 4 {
        return Err(usage(w, "list first last ?element ...?"));
    }
    let mut items = list_of(&w[1])?;
    let first = clamp(list_index(&w[2], items.len())?, items.len());
    let last = list_index(&w[3], items.len())?;
    let end = if last < 0 {
        first
    } else {
        clamp(last + 1, items.len()).max(first)
    };
    items.splice(first..end, w[4..].iter().cloned());
    Ok(list_text(&items))
}

/// `linsert list index ?element ...?`
fn cmd_linsert(_: &mut Interp, w: &[String]) -> Outcome {
    if w.len() < 3 {
        return Err(usage(w, "list index ?element ...?"));
    }
    let mut items = list_of(&w[1])?;
    let at = clamp(list_index(&w[2], items.len())? + i64::from(w[2].starts_with("end")), items.len());
    items.splice(at..at, w[3..].iter().cloned());
    Ok(list_text(&items))
}

/// `lappend varName ?value ...?`
fn cmd_lappend(it: &mut Interp, w: &[String]) -> Outcome {
    let Some(name) = w.get(1) else {
        return Err(usage(w, "varName ?value ...?"));
    };
    let mut items = if it.var_exists(name) {
        list_of(&it.get_var(name)?)?
    } else {
        Vec::new()
    };
    items.extend(w[2..].iter().cloned());
    it.set_var(name, list_text(&items))
}

/// `concat ?arg ...?`
fn cmd_concat(_: &mut Interp, w: &[String]) -> Outcome {
    Ok(w[1..]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" "))
}

/// `join list ?joinString?`
fn cmd_join(_: &mut Interp, w: &[String]) -> Outcome {
    match w {
        [_, list] => Ok(list_of(list)?.join(" ")),
        [_, list, sep] => Ok(list_of(list)?.join(sep)),
        _ => Err(usage(w, "list ?joinString?")),
    }
}

/// `incr varName ?increment?`
fn cmd_incr(it: &mut Interp, w: &[String]) -> Outcome {
    let Some(name) = w.get(1) else {
        return Err(usage(w, "varName ?increment?"));
    };
    let step = w.get(2).map_or(Ok(1), |s| int_of(s))?;
    let current = if it.var_exists(name) {
        int_of(&it.get_var(name)?)?
    } else {
        0
    };
    it.set_var(name, current.wrapping_add(step).to_string())
}

/// `puts ?-nonewline? ?channelId? string`
fn cmd_puts(_: &mut Interp, w: &[String]) -> Outcome {
    let mut args = &w[1..];
    let newline = args.first().is_none_or(|a| a != "-nonewline");
    if !newline {
        args = &args[1..];
    }
    let (channel, text) = match args {
        [text] => ("stdout", text),
        [channel, text] => (channel.as_str(), text),
        _ => return Err(usage(w, "?-nonewline? ?channelId? string")),
    };
    let end = if newline { "\n" } else { "" };
    match channel {
        "stdout" => {
            print!("{text}{end}");
            let _ = std::io::stdout().flush();
        }
        "stderr" => eprint!("{text}{end}"),
        other => return Err(error(format!("can not find channel named \"{other}\""))),
    }
    Ok(String::new())
}

/// `exit ?returnCode?`
fn cmd_exit(_: &mut Interp, w: &[String]) -> Outcome {
    let code = w.get(1).map_or(Ok(0), |c| int_of(c))?;
    Err(Flow::Exit(i32::try_from(code).unwrap_or(1)))
}

/// `dict subcommand ...`
fn cmd_dict(it: &mut Interp, w: &[String]) -> Outcome {
    let sub = w.get(1).map_or("", String::as_str);
    let rest = w.get(2..).unwrap_or_default();
    match sub {
        "create" => {
            if rest.len() % 2 != 0 {
                return Err(usage(w, "?key value ...?"));
            }
            let map = rest
                .chunks(2)
                .map(|kv| (kv[0].clone(), kv[1].clone()))
                .collect();
            Ok(dict_text(&map))
        }
        "get" => {
            let Some((dict, keys)) = rest.split_first() else {
                return Err(usage(w, "dictionary ?key ...?"));
            };
            let mut current = dict.clone();
            for key in keys {
                let map = dict_of(&current)?;
                current = map.get(key).cloned().ok_or_else(|| {
                    error(format!("key \"{key}\" not known in dictionary"))
                })?;
            }
            Ok(current)
        }
        "exists" => {
            let Some((dict, keys)) = rest.split_first() else {
                return Err(usage(w, "dictionary key ?key ...?"));
            };
            let mut current = dict.clone();
            for key in keys {
                match dict_of(&current).ok().and_then(|m| m.get(key).cloned()) {
                    Some(v) => current = v,
                    None => return Ok("0".into()),
                }
            }
            Ok("1".into())
        }
        "replace" => {
            let Some((dict, pairs)) = rest.split_first() else {
                return Err(usage(w, "dictionary ?key value ...?"));
            };
            if pairs.len() % 2 != 0 {
                return Err(usage(w, "dictionary ?key value ...?"));
            }
            let mut map = dict_of(dict)?;
            for kv in pairs.chunks(2) {
                map.insert(kv[0].clone(), kv[1].clone());
            }
            Ok(dict_text(&map))
        }
        "remove" => {
            let Some((dict, keys)) = rest.split_first() else {
                return Err(usage(w, "dictionary ?key ...?"));
            };
            let mut map = dict_of(dict)?;
            for key in keys {
                map.shift_remove(key);
            }
            Ok(dict_text(&map))
        }
        "set" => {
            let [name, key, value] = rest else {
                return Err(usage(w, "dictVarName key value"));
            };
            let mut map = if it.var_exists(name) {
                dict_of(&it.get_var(name)?)?
            } else {
                IndexMap::new()
            };
            map.insert(key.clone(), value.clone());
            it.set_var(name, dict_text(&map))
        }
        "keys" | "values" | "size" => {
            let [dict] = rest else {
                return Err(usage(w, "dictionary"));
            };
            let map = dict_of(dict)?;
            Ok(match sub {
                "keys" => list_text(&map.keys().collect::<Vec<_>>()),
                "values" => list_text(&map.values().collect::<Vec<_>>()),
                _ => map.len().to_string(),
            })
        }
        _ => Err(error(format!("unknown or ambiguous subcommand \"{sub}\""))),
    }
}

/// `namespace subcommand ...`
fn cmd_namespace(it: &mut Interp, w: &[String]) -> Outcome {
    let sub = w.get(1).map_or("", String::as_str);
    let ns = it.current_ns().to_owned();
    match (sub, w.get(2..).unwrap_or_default()) {
        ("current", []) => Ok(ns),
        ("exists", [name]) => Ok(u8::from(it.namespaces.contains(&qualify(name, &ns))).to_string()),
        ("eval", [name, script @ ..]) if !script.is_empty() => {
            let target = qualify(name, &ns);
            it.create_namespace(&target);
            let script = script
                .iter()
                .map(|s| s.trim())
                .collect::<Vec<_>>()
                .join(" ");
            it.scopes.push(Scope {
                locals: None,
                ns: target,
            });
            let result = it.eval(&script);
            it.scopes.pop();
            result
        }
        ("delete", names) => {
            for name in names {
                let target = qualify(name, &ns);
                if target == "::" || !it.namespaces.contains(&target) {
                    return Err(error(format!(
                        "unknown namespace \"{name}\" in namespace delete command"
                    )));
                }
                let prefix = format!("{target}::");
                it.namespaces
                    .retain(|n| n != &target && !n.starts_with(&prefix));
                it.commands.retain(|n, _| !n.starts_with(&prefix));
                it.globals.retain(|n, _| !n.starts_with(&prefix));
            }
            Ok(String::new())
        }
        ("children", args) if args.len() <= 1 => {
            let parent = args.first().map_or(ns.clone(), |n| qualify(n, &ns));
            let children: Vec<&String> = it
                .namespaces
                .iter()
                .filter(|n| n.as_str() != "::" && parent_of(n).0 == parent)
                .collect();
            Ok(list_text(&children))
        }
        ("tail", [name]) => Ok(name.rsplit("::").next().unwrap_or_default().to_owned()),
        _ => Err(usage(w, "subcommand ?arg ...?")),
    }
}

/// Names in `keys` matching a qualified-or-relative `pattern`.
///
/// Qualified patterns match one namespace and return qualified names;
/// relative patterns match the current and global namespaces and return
/// tails.
fn match_names<'a>(
    keys: impl Iterator<Item = &'a String>,
    pattern: Option<&str>,
    current: &str,
) -> Vec<String> {
    let pattern = pattern.unwrap_or("*");
    let mut out: BTreeSet<String> = BTreeSet::new();
    if pattern.starts_with("::") {
        let (ns, tail) = parent_of(pattern);
        let ns = qualify(ns, "::");
        for key in keys {
            let (key_ns, key_tail) = parent_of(key);
            if key_ns == ns && glob(tail, key_tail) {
                out.insert(key.clone());
            }
        }
    } else {
        for key in keys {
            let (key_ns, key_tail) = parent_of(key);
            if (key_ns == current || key_ns == "::") && glob(pattern, key_tail) {
                out.insert(key_tail.to_owned());
            }
        }
    }
    out.into_iter().collect()
}

/// `info subcommand ...`
fn cmd_info(it: &mut Interp, w: &[String]) -> Outcome {
    let sub = w.get(1).map_or("", String::as_str);
    let pattern = w.get(2).map(String::as_str);
    match sub {
        "exists" => match pattern {
            Some(name) => Ok(u8::from(it.var_exists(name)).to_string()),
            None => Err(usage(w, "varName")),
        },
        "commands" => {
            let ns = it.current_ns().to_owned();
            Ok(list_text(&match_names(it.commands.keys(), pattern, &ns)))
        }
        "vars" => {
            let locals = it.scopes.last().and_then(|s| s.locals.as_ref());
            match (locals, pattern) {
                (Some(locals), p) if !p.is_some_and(|p| p.starts_with("::")) => {
                    let mut names: Vec<&String> = locals
                        .keys()
                        .filter(|k| glob(p.unwrap_or("*"), k))
                        .collect();
                    names.sort();
                    Ok(list_text(&names))
                }
                _ => {
                    let ns = it.current_ns().to_owned();
                    Ok(list_text(&match_names(it.globals.keys(), pattern, &ns)))
                }
            }
        }
        "patchlevel" => Ok(PATCHLEVEL.to_owned()),
        "tclversion" => Ok(PATCHLEVEL.rsplit_once('.').map_or(PATCHLEVEL, |(v, _)| v).to_owned()),
        _ => Err(error(format!("unknown or ambiguous subcommand \"{sub}\""))),
    }
}

/// `array subcommand arrayName ...`
fn cmd_array(it: &mut Interp, w: &[String]) -> Outcome {
    let sub = w.get(1).map_or("", String::as_str);
    let Some(name) = w.get(2) else {
        return Err(usage(w, "subcommand arrayName ?arg ...?"));
    };
    let pattern = w.get(3).map_or("*", String::as_str);
    match sub {
        "exists" => Ok(u8::from(it.array_mut(name).is_some()).to_string()),
        "size" => Ok(it.array_mut(name).map_or(0, |a| a.len()).to_string()),
        "get" => {
            let mut flat = Vec::new();
            if let Some(a) = it.array_mut(name) {
                for (k, v) in a.iter().filter(|(k, _)| glob(pattern, k)) {
                    flat.push(k.clone());
                    flat.push(v.clone());
                }
            }
            Ok(list_text(&flat))
        }
        "names" => {
            let names: Vec<String> = it
                .array_mut(name)
                .map(|a| a.keys().filter(|k| glob(pattern, k)).cloned().collect())
                .unwrap_or_default();
            Ok(list_text(&names))
        }
        "set" => {
            let Some(list) = w.get(3) else {
                return Err(usage(w, "arrayName list"));
            };
            let items = list_of(list)?;
            if items.len() % 2 != 0 {
                return Err(error("list must have an even number of elements"));
            }
            if it.var_exists(name) && it.array_mut(name).is_none() {
                return Err(error(format!("can't set \"{name}(..)\": variable isn't array")));
            }
            let (table, slot) = it.table(name);
            let entry = table
                .entry(slot)
                .or_insert_with(|| Var::Array(IndexMap::new()));
            if let Var::Array(a) = entry {
                for kv in items.chunks(2) {
                    a.insert(kv[0].clone(), kv[1].clone());
                }
            }
            Ok(String::new())
        }
        "unset" => {
            match w.get(3) {
                None => {
                    it.unset_var(name);
                }
                Some(p) => {
                    if let Some(a) = it.array_mut(name) {
                        a.retain(|k, _| !glob(p, k));
                    }
                }
            }
            Ok(String::new())
        }
        _ => Err(error(format!("unknown or ambiguous subcommand \"{sub}\""))),
    }
}

/// `string subcommand ...`
fn cmd_string(_: &mut Interp, w: &[String]) -> Outcome {
    let sub = w.get(1).map_or("", String::as_str);
    match (sub, w.get(2..).unwrap_or_default()) {
        ("length", [s]) => Ok(s.chars().count().to_string()),
        ("equal", [a, b]) => Ok(u8::from(a == b).to_string()),
        ("toupper", [s]) => Ok(s.to_uppercase()),
        ("tolower", [s]) => Ok(s.to_lowercase()),
        ("trim", [s]) => Ok(s.trim().to_owned()),
        ("match", [p, s]) => Ok(u8::from(glob(p, s)).to_string()),
        ("repeat", [s, n]) => Ok(s.repeat(usize::try_from(int_of(n)?).unwrap_or(0))),
        _ => Err(usage(w, "subcommand ?arg ...?")),
    }
}

/// `source fileName`
fn cmd_source(it: &mut Interp, w: &[String]) -> Outcome {
    let [_, path] = w else {
        return Err(usage(w, "fileName"));
    };
    let script = std::fs::read_to_string(path)
        .map_err(|e| error(format!("couldn't read file \"{path}\": {e}")))?;
    match it.eval(&script) {
        Err(Flow::Return(v)) => Ok(v),
        other => other,
    }
}

/// `cd ?dirName?`
fn cmd_cd(_: &mut Interp, w: &[String]) -> Outcome {
    let dir = match w.get(1) {
        Some(dir) => dir.clone(),
        None => std::env::var("HOME").map_err(|_| error("couldn't find HOME environment variable to expand path"))?,
    };
    std::env::set_current_dir(&dir)
        .map_err(|e| error(format!("couldn't change working directory to \"{dir}\": {e}")))?;
    Ok(String::new())
}

/// `pwd`
fn cmd_pwd(_: &mut Interp, _: &[String]) -> Outcome {
    std::env::current_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(|e| error(format!("error getting working directory name: {e}")))
}

/// `catch script ?resultVarName?`
fn cmd_catch(it: &mut Interp, w: &[String]) -> Outcome {
    let Some(script) = w.get(1) else {
        return Err(usage(w, "script ?resultVarName? ?optionVarName?"));
    };
    let (code, value) = match it.eval(script) {
        Ok(v) => (0, v),
        Err(Flow::Error(m)) => (1, m),
        Err(Flow::Return(v)) => (2, v),
        Err(Flow::Break) => (3, String::new()),
        Err(Flow::Continue) => (4, String::new()),
        Err(exit @ Flow::Exit(_)) => return Err(exit),
    };
    if let Some(var) = w.get(2) {
        it.set_var(var, value)?;
    }
    Ok(code.to_string())
}

/// `if cond ?then? body ?elseif cond ?then? body ...? ?else? ?body?`
fn cmd_if(it: &mut Interp, w: &[String]) -> Outcome {
    let mut i = 1;
    loop {
        let Some(cond) = w.get(i) else {
            return Err(usage(w, "expr1 ?then? body1 elseif expr2 ?then? body2 ... ?else? ?bodyN?"));
        };
        i += 1;
        if w.get(i).map(String::as_str) == Some("then") {
            i += 1;
        }
        let Some(body) = w.get(i) else {
            return Err(error(format!("wrong # args: no script following \"{cond}\" argument")));
        };
        i += 1;
        if truthy(&it.expr(cond)?)? {
            return it.eval(body);
        }
        match w.get(i).map(String::as_str) {
            None => return Ok(String::new()),
            Some("elseif") => i += 1,
            Some("else") => {
                return match w.get(i + 1) {
                    Some(body) => it.eval(body),
                    None => Err(error("wrong # args: no script following \"else\" argument")),
                };
            }
            Some(_) => return it.eval(&w[i]),
        }
    }
}

/// `foreach varName list body`
fn cmd_foreach(it: &mut Interp, w: &[String]) -> Outcome {
    let [_, var, list, body] = w else {
        return Err(usage(w, "varList list body"));
    };
    for item in list_of(list)? {
        it.set_var(var, item)?;
        match it.eval(body) {
            Ok(_) | Err(Flow::Continue) => {}
            Err(Flow::Break) => break,
            Err(other) => return Err(other),
        }
    }
    Ok(String::new())
}

/// `while test body`
fn cmd_while(it: &mut Interp, w: &[String]) -> Outcome {
    let [_, test, body] = w else {
        return Err(usage(w, "test command"));
    };
    while truthy(&it.expr(test)?)? {
        match it.eval(body) {
            Ok(_) | Err(Flow::Continue) => {}
            Err(Flow::Break) => break,
            Err(other) => return Err(other),
        }
    }
    Ok(String::new())
}

/// `expr arg ?arg ...?`
fn cmd_expr(it: &mut Interp, w: &[String]) -> Outcome {
    if w.len() < 2 {
        return Err(usage(w, "arg ?arg ...?"));
    }
    it.expr(&w[1..].join(" "))
}

/// `::tclbridge::invoke id ?arg ...?`: calls a host function and serves
/// nested host requests until it answers.
fn cmd_invoke(it: &mut Interp, w: &[String]) -> Outcome {
    if w.len() < 2 {
        return Err(usage(w, "id ?arg ...?"));
    }
    it.send(&Message::call(list_text(&w[1..])))?;
    loop {
        let msg = it.receive()?;
        match msg.op {
            OpCode::Return => return Ok(msg.body),
            OpCode::Error => return Err(Flow::Error(msg.body)),
            OpCode::Call => it.serve(&msg.body)?,
            OpCode::Close | OpCode::Exit => return Err(Flow::Exit(0)),
            other => return Err(error(format!("unexpected {other} message"))),
        }
    }
}

/// `::tclbridge::rekey keyHex seedHex`: switches keys before replying.
fn cmd_rekey(it: &mut Interp, w: &[String]) -> Outcome {
    let [_, key, seed] = w else {
        return Err(usage(w, "key seed"));
    };
    let key = Key::from_hex(key).map_err(|e| error(e.to_string()))?;
    let peer = it.peer.as_mut().ok_or_else(|| error("not connected to a host"))?;
    peer.endpoint.set_cipher(Some(Cipher::new(key)));
    peer.rng = StdRng::seed_from_u64(parse_seed(seed));
    Ok("1".to_owned())
}

/// `::tclbridge::rename_callback old new`: renames a callback command and
/// tells the host.
fn cmd_rename_callback(it: &mut Interp, w: &[String]) -> Outcome {
    let [_, old, new] = w else {
        return Err(usage(w, "oldName newName"));
    };
    cmd_rename(it, &["rename".to_owned(), old.clone(), new.clone()])?;
    it.send(&Message::new(OpCode::Rename, list_text(&[old, new])))?;
    Ok(String::new())
}

/// Boolean value of an expression result.
fn truthy(text: &str) -> Result<bool, Flow> {
    parse_bool(text).map_err(|_| error(format!("expected boolean value but got \"{text}\"")))
}

/// An expression operand.
#[derive(Debug, Clone)]
enum Operand {
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// Anything non-numeric.
    Str(String),
}

impl Operand {
    /// Classifies `text`.
    fn from_text(text: String) -> Self {
        match parse_number(&text) {
            Ok(Number::Int(n)) => Self::Int(n),
            Ok(Number::Float(x)) => Self::Float(x),
            _ => Self::Str(text),
        }
    }

    /// Result text.
    fn text(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Float(x) => format_float(*x),
            Self::Str(s) => s.clone(),
        }
    }

    /// Truth value.
    #[allow(clippy::float_cmp)]
    fn truthy(&self) -> Result<bool, Flow> {
        match self {
            Self::Int(n) => Ok(*n != 0),
            Self::Float(x) => Ok(*x != 0.0),
            Self::Str(s) => truthy(s),
        }
    }

    /// Numeric value as a float.
    #[allow(clippy::cast_precision_loss)]
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(x) => Some(*x),
            Self::Str(_) => None,
        }
    }
}

/// Boolean operand.
fn boolean(b: bool) -> Operand {
    Operand::Int(i64::from(b))
}

/// Binary operators with their precedence.
const OPERATORS: &[(&str, u8)] = &[
    ("||", 1),
    ("&&", 2),
    ("==", 3),
    ("!=", 3),
    ("eq", 3),
    ("ne", 3),
    ("<=", 4),
    (">=", 4),
    ("<", 4),
    (">", 4),
    ("+", 5),
    ("-", 5),
    ("*", 6),
    ("/", 6),
    ("%", 6),
];

/// Applies a binary operator.
fn apply(op: &str, a: &Operand, b: &Operand) -> Result<Operand, Flow> {
    use Operand::{Float, Int};
    use std::cmp::Ordering::{Equal, Greater, Less};

    match op {
        "||" => return Ok(boolean(a.truthy()? || b.truthy()?)),
        "&&" => return Ok(boolean(a.truthy()? && b.truthy()?)),
        "eq" => return Ok(boolean(a.text() == b.text())),
        "ne" => return Ok(boolean(a.text() != b.text())),
        _ => {}
    }
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        let ordering = x.partial_cmp(&y);
        let compare = |want: &[std::cmp::Ordering]| ordering.is_some_and(|o| want.contains(&o));
        match op {
            "==" => return Ok(boolean(compare(&[Equal]))),
            "!=" => return Ok(boolean(!compare(&[Equal]))),
            "<" => return Ok(boolean(compare(&[Less]))),
            ">" => return Ok(boolean(compare(&[Greater]))),
            "<=" => return Ok(boolean(compare(&[Less, Equal]))),
            ">=" => return Ok(boolean(compare(&[Greater, Equal]))),
            _ => {}
        }
        return Ok(match (a, b) {
            (Int(m), Int(n)) => match op {
                "+" => Int(m.wrapping_add(*n)),
                "-" => Int(m.wrapping_sub(*n)),
                "*" => Int(m.wrapping_mul(*n)),
                "/" | "%" if *n == 0 => return Err(error("divide by zero")),
                "/" => Int(m.div_euclid(*n) - i64::from(*n < 0 && m.rem_euclid(*n) != 0)),
                _ => Int(m - n * (m.div_euclid(*n) - i64::from(*n < 0 && m.rem_euclid(*n) != 0))),
            },
            _ => match op {
                "+" => Float(x + y),
                "-" => Float(x - y),
                "*" => Float(x * y),
                "/" => Float(x / y),
                _ => return Err(error("can't use floating-point value as operand of \"%\"")),
            },
        });
    }
    let (x, y) = (a.text(), b.text());
    match op {
        "==" => Ok(boolean(x == y)),
        "!=" => Ok(boolean(x != y)),
        "<" => Ok(boolean(x < y)),
        ">" => Ok(boolean(x > y)),
        "<=" => Ok(boolean(x <= y)),
        ">=" => Ok(boolean(x >= y)),
        _ => Err(error(format!(
            "can't use non-numeric string as operand of \"{op}\""
        ))),
    }
}

/// Recursive-descent evaluator for `expr`.
struct ExprParser<'a> {
    /// Interpreter for `$` and `[]` substitution.
    it: &'a mut Interp,
    /// Expression text.
    cur: Cursor,
}

impl ExprParser<'_> {
    /// Skips whitespace.
    fn skip_ws(&mut self) {
        while self.cur.peek().is_some_and(char::is_whitespace) {
            self.cur.pos += 1;
        }
    }

    /// The binary operator at the cursor, if any.
    fn peek_op(&self) -> Option<(&'static str, u8)> {
        OPERATORS.iter().copied().find(|(op, _)| {
            self.cur.starts_with(op)
                && (!op.starts_with(char::is_alphabetic)
                    || !self
                        .cur
                        .peek_at(op.len())
                        .is_some_and(char::is_alphanumeric))
        })
    }

    /// Operators of precedence `min` and above.
    fn binary(&mut self, min: u8) -> Result<Operand, Flow> {
        let mut lhs = self.unary()?;
        loop {
            self.skip_ws();
            let Some((op, prec)) = self.peek_op() else {
                break;
            };
            if prec < min {
                break;
            }
            self.cur.pos += op.len();
            let rhs = self.binary(prec + 1)?;
            lhs = apply(op, &lhs, &rhs)?;
        }
        Ok(lhs)
    }

    /// Prefix operators and parentheses.
    fn unary(&mut self) -> Result<Operand, Flow> {
        self.skip_ws();
        match self.cur.peek() {
            Some('-') => {
                self.cur.pos += 1;
                match self.unary()? {
                    Operand::Int(n) => Ok(Operand::Int(n.wrapping_neg())),
                    Operand::Float(x) => Ok(Operand::Float(-x)),
                    Operand::Str(s) => Err(error(format!(
                        "can't use non-numeric string \"{s}\" as operand of \"-\""
                    ))),
                }
            }
            Some('+') => {
                self.cur.pos += 1;
                self.unary()
            }
            Some('!') => {
                self.cur.pos += 1;
                Ok(boolean(!self.unary()?.truthy()?))
            }
            Some('(') => {
                self.cur.pos += 1;
                let inner = self.binary(0)?;
                self.skip_ws();
                if self.cur.bump() != Some(')') {
                    return Err(error("missing close parenthesis"));
                }
                Ok(inner)
            }
            _ => self.operand(),
        }
    }

    /// A literal, variable, command or quoted operand.
    fn operand(&mut self) -> Result<Operand, Flow> {
        let text = match self.cur.peek() {
            Some('$') => {
                self.cur.pos += 1;
                let mut out = String::new();
                self.it.subst_var(&mut self.cur, &mut out)?;
                out
            }
            Some('[') => {
                self.cur.pos += 1;
                let script = bracketed(&mut self.cur)?;
                self.it.eval(&script)?
            }
            Some('"') => {
                self.cur.pos += 1;
                return Ok(Operand::Str(self.it.subst_until(&mut self.cur, Until::Quote)?));
            }
            Some('{') => return Ok(Operand::Str(braced(&mut self.cur)?)),
            Some(c) if c.is_ascii_alphanumeric() || c == '.' => {
                let mut word = String::new();
                while let Some(c) = self.cur.peek() {
                    let exponent_sign = (c == '+' || c == '-')
                        && word.ends_with(['e', 'E'])
                        && !word.starts_with("0x");
                    if c.is_ascii_alphanumeric() || c == '.' || exponent_sign {
                        word.push(c);
                        self.cur.pos += 1;
                    } else {
                        break;
                    }
                }
                word
            }
            _ => {
                let rest: String = self.cur.chars[self.cur.pos..].iter().collect();
                return Err(error(format!("syntax error in expression near \"{rest}\"")));
            }
        };
        Ok(Operand::from_text(text))
    }
}

impl Interp {
    /// Evaluates an `expr` expression.
    fn expr(&mut self, text: &str) -> Outcome {
        let mut parser = ExprParser {
            it: self,
            cur: Cursor::new(text),
        };
        let value = parser.binary(0)?;
        parser.skip_ws();
        if parser.cur.peek().is_some() {
            return Err(error(format!("syntax error in expression \"{text}\"")));
        }
        Ok(value.text())
    }
}
