//! Thompson NFA construction and simulation for a minimal regular
//! expression syntax.
//!
//! Based on Russ Cox's article <https://swtch.com/~rsc/regexp/regexp1.html>
//! and on Thompson, Ken. "Regular Expression Search Algorithm",
//! Communications of the ACM 11(6) (June 1968), pp. 419-422.
//!
//! # Syntax
//!
//! Only six bytes are special: `(` `)` `|` `*` `+` `?`.  Every other byte
//! (including `.`, `\`, `[`, `^` and `$`) is a literal.  There are no
//! escapes, classes, anchors or captures, and a pattern always has to
//! match the *whole* subject.
//!
//! # Architecture
//!
//! The pipeline is:
//!
//! ```text
//! pattern ──Postfix::parse──>  postfix nodes  ──RegexBuilder──>  NFA states  ──Matcher──>  bool
//! ```
//!
//! 1. [`Postfix::parse`] rewrites the infix pattern into postfix order and
//!    makes concatenation explicit, e.g. `a(bb)+a` becomes `abb.+.a.`.
//! 2. [`RegexBuilder`] consumes the postfix nodes with a stack of
//!    fragments, using Thompson's construction.  Each fragment keeps
//!    a patch list of transition slots that are still dangling; those
//!    slots are filled in once the successor state is known.
//! 3. [`Matcher`] simulates the automaton by tracking the set of *all*
//!    states the NFA could be in after each byte.  There is no
//!    backtracking, so matching is `O(subject.len() * states)` no matter
//!    how ambiguous the pattern is.
//!
//! ## Deduplication
//!
//! Each state carries a generation stamp (`lastlist`) in
//! [`MatcherMemory`].  A state is added to the next list only if its stamp
//! differs from the current generation (`listid`), and the generation is
//! bumped once per input byte.  That way the per-step cost is proportional
//! to the states visited in that step, never to the automaton size, and
//! nothing has to be cleared between steps.
//!
//! ```
//! let re = regex_thompson::compile("(ab)+").unwrap();
//! assert!(re.is_match("abab"));
//! assert!(!re.is_match("aba"));
//! ```

use std::fmt;
use std::io::Write;
use std::ops::{Index, IndexMut};

use log::{debug, trace};
use thiserror::Error;

/// Default value of [`Limits::max_pattern_len`].
///
/// This is the longest pattern the classic 8000-byte postfix buffer could
/// hold (it rejected patterns of half its size or more).
pub const DEFAULT_MAX_PATTERN_LEN: usize = 3999;

/// Hard cap on [`Limits::max_pattern_len`].
///
/// Every pattern byte yields at most one NFA state, and states are
/// addressed by `u32` with `u32::MAX` reserved, so longer patterns could
/// not be indexed.  Larger configured limits are clamped to this value.
pub const MAX_PATTERN_LEN: usize = u32::MAX as usize - 2;

/// Default value of [`Limits::max_nesting`].
pub const DEFAULT_MAX_NESTING: usize = 100;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// An error returned when a pattern cannot be compiled.
///
/// Offsets are byte offsets into the pattern.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A `)` with no open group.
    #[error("unmatched `)` at offset {offset}")]
    UnmatchedCloseParen { offset: usize },

    /// The pattern ended inside a group.  `offset` points at the innermost
    /// `(` that was never closed.
    #[error("unclosed `(` at offset {offset}")]
    UnmatchedOpenParen { offset: usize },

    /// A `*`, `+` or `?` with nothing to repeat.
    #[error("quantifier `{quantifier}` at offset {offset} has nothing to repeat")]
    DanglingQuantifier { offset: usize, quantifier: char },

    /// An alternative with no atoms in it, as in `|a`, `a||b`, `(a|)` or
    /// `a|`.
    #[error("empty alternative at offset {offset}")]
    EmptyAlternative { offset: usize },

    /// A group with no atoms in it: `()`.
    #[error("empty group at offset {offset}")]
    EmptyGroup { offset: usize },

    /// The pattern is longer than [`Limits::max_pattern_len`], or a
    /// postfix stream needs more states than [`MAX_PATTERN_LEN`] allows.
    #[error("pattern is {len} bytes long (max: {max})")]
    PatternTooLong { len: usize, max: usize },

    /// Opening the group at `offset` would exceed [`Limits::max_nesting`].
    #[error("groups nested too deeply at offset {offset} (max: {max})")]
    NestingTooDeep { offset: usize, max: usize },

    /// The postfix stream does not reduce to exactly one fragment.
    /// `position` is the index of the node where this was detected, or
    /// the stream length if it was detected at the end.
    ///
    /// Streams produced by [`Postfix::parse`] never trigger this.
    #[error("malformed postfix expression at node {position}")]
    MalformedPostfix { position: usize },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Capacity limits enforced while rewriting a pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Maximum pattern length in bytes.  Values above
    /// [`MAX_PATTERN_LEN`] behave like [`MAX_PATTERN_LEN`].
    pub max_pattern_len: usize,
    /// Maximum depth of nested groups.
    pub max_nesting: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_pattern_len: DEFAULT_MAX_PATTERN_LEN,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

// ---------------------------------------------------------------------------
// Postfix rewriting
// ---------------------------------------------------------------------------

/// A single postfix token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostfixNode {
    /// Match a literal byte.
    Byte(u8),
    /// `.`: concatenate the two topmost operands.
    Catenate,
    /// `|`: alternate between the two topmost operands.
    Alternate,
    /// `?`
    RepeatZeroOne,
    /// `*`
    RepeatZeroPlus,
    /// `+`
    RepeatOnePlus,
}

/// A pattern in postfix order with explicit concatenation.
///
/// The `Display` impl renders the familiar postfix string (`ab.?b.a.` for
/// `(ab)?ba`).  Literal bytes that would read as operators are prefixed
/// with `\`, and non-printable bytes are written as `\xNN`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Postfix(Vec<PostfixNode>);

/// Atom/alternative counters saved when a group is opened.
#[derive(Debug)]
struct Group {
    /// Offset of the `(`, reported if the group is never closed.
    offset: usize,
    natom: usize,
    nalt: usize,
}

impl Postfix {
    /// Rewrite an infix `pattern` into postfix order.
    ///
    /// `natom` counts the operands pending in the current alternative and
    /// `nalt` the `|` seen so far in the current group.  Whenever a second
    /// operand is complete the first two are joined with a `.`, so at most
    /// two operands are pending at any time.  `)`, `|` and the end of
    /// input flush the pending operands; `)` and the end of input also
    /// emit one `|` per pending bar.
    pub fn parse(pattern: &str, limits: &Limits) -> Result<Self, Error> {
        let pattern = pattern.as_bytes();
        let max_pattern_len = limits.max_pattern_len.min(MAX_PATTERN_LEN);
        if pattern.len() > max_pattern_len {
            return Err(Error::PatternTooLong {
                len: pattern.len(),
                max: max_pattern_len,
            });
        }

        let mut nodes = Vec::with_capacity(pattern.len() * 2);
        let mut groups: Vec<Group> = Vec::new();
        let mut natom = 0;
        let mut nalt = 0;

        for (offset, &byte) in pattern.iter().enumerate() {
            match byte {
                b'(' => {
                    if natom > 1 {
                        natom -= 1;
                        nodes.push(PostfixNode::Catenate);
                    }
                    if groups.len() >= limits.max_nesting {
                        return Err(Error::NestingTooDeep {
                            offset,
                            max: limits.max_nesting,
                        });
                    }
                    groups.push(Group {
                        offset,
                        natom,
                        nalt,
                    });
                    natom = 0;
                    nalt = 0;
                }
                b'|' => {
                    if natom == 0 {
                        return Err(Error::EmptyAlternative { offset });
                    }
                    flush(&mut nodes, natom, 0);
                    natom = 0;
                    nalt += 1;
                }
                b')' => {
                    let Some(group) = groups.pop() else {
                        return Err(Error::UnmatchedCloseParen { offset });
                    };
                    if natom == 0 {
                        return Err(if nalt > 0 {
                            Error::EmptyAlternative { offset }
                        } else {
                            Error::EmptyGroup { offset }
                        });
                    }
                    flush(&mut nodes, natom, nalt);
                    // The closed group counts as one atom of the enclosing
                    // alternative.
                    natom = group.natom + 1;
                    nalt = group.nalt;
                }
                b'*' | b'+' | b'?' => {
                    if natom == 0 {
                        return Err(Error::DanglingQuantifier {
                            offset,
                            quantifier: byte as char,
                        });
                    }
                    nodes.push(match byte {
                        b'*' => PostfixNode::RepeatZeroPlus,
                        b'+' => PostfixNode::RepeatOnePlus,
                        _ => PostfixNode::RepeatZeroOne,
                    });
                }
                _ => {
                    if natom > 1 {
                        natom -= 1;
                        nodes.push(PostfixNode::Catenate);
                    }
                    nodes.push(PostfixNode::Byte(byte));
                    natom += 1;
                }
            }
        }

        if let Some(group) = groups.last() {
            return Err(Error::UnmatchedOpenParen {
                offset: group.offset,
            });
        }
        if natom == 0 && nalt > 0 {
            return Err(Error::EmptyAlternative {
                offset: pattern.len(),
            });
        }
        flush(&mut nodes, natom, nalt);

        Ok(Self(nodes))
    }

    /// The postfix nodes, in evaluation order.
    pub fn nodes(&self) -> &[PostfixNode] {
        &self.0
    }

    /// Number of postfix nodes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` for the empty pattern.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Concatenate `natom` pending operands down to one, then join `nalt + 1`
/// alternatives.
fn flush(nodes: &mut Vec<PostfixNode>, natom: usize, nalt: usize) {
    for _ in 1..natom {
        nodes.push(PostfixNode::Catenate);
    }
    for _ in 0..nalt {
        nodes.push(PostfixNode::Alternate);
    }
}

/// Wrap hand-built node sequences, e.g. to feed
/// [`RegexBuilder::build_postfix`] directly.
impl From<Vec<PostfixNode>> for Postfix {
    fn from(nodes: Vec<PostfixNode>) -> Self {
        Self(nodes)
    }
}

impl fmt::Display for PostfixNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Byte(b @ (b'.' | b'|' | b'*' | b'+' | b'?' | b'\\')) => {
                write!(f, "\\{}", b as char)
            }
            Self::Byte(b) if b.is_ascii_graphic() || b == b' ' => write!(f, "{}", b as char),
            Self::Byte(b) => write!(f, "\\x{:02x}", b),
            Self::Catenate => f.write_str("."),
            Self::Alternate => f.write_str("|"),
            Self::RepeatZeroOne => f.write_str("?"),
            Self::RepeatZeroPlus => f.write_str("*"),
            Self::RepeatOnePlus => f.write_str("+"),
        }
    }
}

impl fmt::Display for Postfix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|node| write!(f, "{}", node))
    }
}

// ---------------------------------------------------------------------------
// NFA states
// ---------------------------------------------------------------------------

/// A single NFA state.
///
/// `Split` states are followed during [`Matcher::addstate`] and never
/// stored in a state list.  `Byte` states are stepped over in
/// [`Matcher::step`].
#[derive(Clone, Copy, Debug)]
enum State {
    /// Epsilon fork: follow both `out` and `out1`.
    Split { out: StateIdx, out1: StateIdx },

    /// Match a literal byte, then follow `out`.
    Byte { byte: u8, out: StateIdx },

    /// Accepting state.  There is exactly one per compiled [`Regex`].
    Match,
}

/// Names one outgoing transition of a state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Out,
    Out1,
}

impl State {
    /// Point the transition `slot` at `target`.
    ///
    /// Only ever called by [`RegexBuilder::patch`] on a slot that is still
    /// dangling.
    fn set(&mut self, slot: Slot, target: StateIdx) {
        let dangling = match (self, slot) {
            (State::Byte { out, .. }, Slot::Out) | (State::Split { out, .. }, Slot::Out) => out,
            (State::Split { out1, .. }, Slot::Out1) => out1,
            (state, slot) => unreachable!("no {:?} transition on {:?}", slot, state),
        };
        debug_assert_eq!(*dangling, StateIdx::NONE, "transition patched twice");
        *dangling = target;
    }
}

/// Index into the NFA state array ([`Regex::states`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct StateIdx(u32);

impl StateIdx {
    /// Sentinel value for unpatched transitions during construction.
    const NONE: Self = Self(u32::MAX);

    /// Return the raw index as `usize`.  Panics on `NONE` in debug builds.
    #[inline]
    fn idx(self) -> usize {
        debug_assert!(self != Self::NONE, "StateIdx::NONE used as index");
        self.0 as usize
    }
}

impl fmt::Display for StateIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `states[state_idx]` — typed access to the NFA state array.
impl Index<StateIdx> for [State] {
    type Output = State;

    #[inline]
    fn index(&self, idx: StateIdx) -> &State {
        &self[idx.idx()]
    }
}

impl IndexMut<StateIdx> for [State] {
    #[inline]
    fn index_mut(&mut self, idx: StateIdx) -> &mut State {
        &mut self[idx.idx()]
    }
}

// ---------------------------------------------------------------------------
// Patch lists and fragments (used during construction)
// ---------------------------------------------------------------------------

/// Index into [`RegexBuilder::patches`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PatchIdx(usize);

/// One dangling transition slot, linked to the next slot of the same list.
#[derive(Clone, Copy, Debug)]
struct PatchNode {
    state: StateIdx,
    slot: Slot,
    next: Option<PatchIdx>,
}

/// A non-empty list of dangling slots, threaded through the builder's
/// patch arena.  Keeping the tail makes [`RegexBuilder::append`] O(1).
#[derive(Clone, Copy, Debug)]
struct PatchList {
    head: PatchIdx,
    tail: PatchIdx,
}

/// A partially-built NFA fragment with a `start` state and the list of
/// slots that will be patched to whatever follows it.
#[derive(Debug)]
struct Fragment {
    start: StateIdx,
    out: PatchList,
}

impl Fragment {
    fn new(start: StateIdx, out: PatchList) -> Self {
        Self { start, out }
    }
}

// ---------------------------------------------------------------------------
// Compiled regex
// ---------------------------------------------------------------------------

struct StateList(Box<[State]>);

impl fmt::Debug for StateList {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_map().entries(self.0.iter().enumerate()).finish()
    }
}

impl std::ops::Deref for StateList {
    type Target = [State];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A compiled NFA ready for matching.
///
/// A `Regex` is immutable, so it can be shared between threads; every
/// concurrent match needs its own [`MatcherMemory`].
#[derive(Debug)]
pub struct Regex {
    states: StateList,
    start: StateIdx,
    /// The unique accepting state.
    match_state: StateIdx,
    /// The postfix stream the states were built from.
    postfix: Postfix,
}

impl Regex {
    /// Compile `pattern` with the default [`Limits`].
    pub fn new(pattern: &str) -> Result<Self, Error> {
        RegexBuilder::default().build(pattern)
    }

    /// Whether the whole of `subject` matches.
    ///
    /// Allocates a fresh [`MatcherMemory`]; use
    /// [`MatcherMemory::matcher`] to reuse buffers across calls.
    pub fn is_match(&self, subject: impl AsRef<[u8]>) -> bool {
        let mut memory = MatcherMemory::default();
        let mut matcher = memory.matcher(self);
        matcher.chunk(subject.as_ref());
        matcher.finish()
    }

    /// The postfix stream this automaton was built from.
    pub fn postfix(&self) -> &Postfix {
        &self.postfix
    }

    /// Number of NFA states, including the `Match` state.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Return the total memory footprint (in bytes) of this compiled
    /// regex, including both inline and heap-allocated data.
    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.states.len() * std::mem::size_of::<State>()
            + self.postfix.0.capacity() * std::mem::size_of::<PostfixNode>()
    }

    /// Emit a Graphviz DOT representation of the NFA.
    ///
    /// Byte transitions are labelled with the (escaped) byte, epsilon
    /// transitions are dashed, and the `Match` state has a double border.
    pub fn to_dot(&self, mut buffer: impl Write) -> std::io::Result<()> {
        let mut visited = vec![false; self.states.len()];
        writeln!(buffer, "digraph nfa {{")?;
        writeln!(buffer, "\trankdir=LR;")?;
        writeln!(buffer, "\t{} [shape=box];", self.start)?;
        let mut stack = vec![self.start];
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut visited[idx.idx()], true) {
                continue;
            }
            match self.states[idx] {
                State::Split { out, out1 } => {
                    for target in [out, out1] {
                        writeln!(buffer, "\t{} -> {} [style=dashed];", idx, target)?;
                        stack.push(target);
                    }
                }
                State::Byte { byte, out } => {
                    writeln!(
                        buffer,
                        "\t{} -> {} [label=\"{}\"];",
                        idx,
                        out,
                        std::ascii::escape_default(byte)
                    )?;
                    stack.push(out);
                }
                State::Match => {
                    writeln!(buffer, "\t{} [peripheries=2];", idx)?;
                }
            }
        }
        writeln!(buffer, "}}")
    }
}

/// Compile `pattern` with the default [`Limits`].
pub fn compile(pattern: &str) -> Result<Regex, Error> {
    Regex::new(pattern)
}

/// Whether the whole of `subject` matches the compiled `regex`.
pub fn matches(regex: &Regex, subject: impl AsRef<[u8]>) -> bool {
    regex.is_match(subject)
}

// ---------------------------------------------------------------------------
// NFA builder (pattern -> postfix -> NFA)
// ---------------------------------------------------------------------------

/// Builds a compiled [`Regex`] from a pattern.
///
/// The pipeline is:
/// 1. [`Postfix::parse`] — rewrites the pattern into postfix nodes,
///    enforcing the configured [`Limits`].
/// 2. [`next_fragment`](Self::next_fragment) — consumes postfix nodes one
///    at a time, emitting NFA [`State`]s and wiring [`Fragment`]s together.
/// 3. [`build_postfix`](Self::build_postfix) — drives the construction and
///    patches the final fragment to the `Match` state.
///
/// The scratch buffers are kept between builds, so one builder can compile
/// many patterns without reallocating.
#[derive(Debug, Default)]
pub struct RegexBuilder {
    limits: Limits,
    states: Vec<State>,
    frags: Vec<Fragment>,
    /// Arena backing every [`PatchList`] of the build in progress.
    patches: Vec<PatchNode>,
}

impl RegexBuilder {
    /// Maximum pattern length in bytes (default
    /// [`DEFAULT_MAX_PATTERN_LEN`], clamped to [`MAX_PATTERN_LEN`]).
    pub fn max_pattern_len(&mut self, len: usize) -> &mut Self {
        self.limits.max_pattern_len = len.min(MAX_PATTERN_LEN);
        self
    }

    /// Maximum depth of nested groups (default [`DEFAULT_MAX_NESTING`]).
    pub fn max_nesting(&mut self, depth: usize) -> &mut Self {
        self.limits.max_nesting = depth;
        self
    }

    /// The limits the next [`build`](Self::build) will enforce.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    // -- Low-level NFA construction helpers ----------------------------------

    /// Push a new NFA state and return its index.
    ///
    /// `build_postfix` caps the state count below `StateIdx::NONE`.
    fn state(&mut self, state: State) -> StateIdx {
        debug_assert!(self.states.len() < StateIdx::NONE.0 as usize);
        let idx = StateIdx(self.states.len() as u32);
        self.states.push(state);
        idx
    }

    /// Create a patch list holding the single slot `slot` of `state`.
    fn list1(&mut self, state: StateIdx, slot: Slot) -> PatchList {
        let idx = PatchIdx(self.patches.len());
        self.patches.push(PatchNode {
            state,
            slot,
            next: None,
        });
        PatchList {
            head: idx,
            tail: idx,
        }
    }

    /// Join two patch lists.  Both inputs are consumed.
    fn append(&mut self, list1: PatchList, list2: PatchList) -> PatchList {
        self.patches[list1.tail.0].next = Some(list2.head);
        PatchList {
            head: list1.head,
            tail: list2.tail,
        }
    }

    /// Point every slot in `list` at `target`.
    fn patch(&mut self, list: PatchList, target: StateIdx) {
        let mut next = Some(list.head);
        while let Some(p) = next {
            let node = self.patches[p.0];
            self.states.as_mut_slice()[node.state].set(node.slot, target);
            next = node.next;
        }
    }

    fn pop(&mut self, position: usize) -> Result<Fragment, Error> {
        self.frags
            .pop()
            .ok_or(Error::MalformedPostfix { position })
    }

    /// Consume one postfix node and return the corresponding NFA fragment.
    #[inline]
    fn next_fragment(&mut self, position: usize, node: PostfixNode) -> Result<Fragment, Error> {
        let frag = match node {
            PostfixNode::Byte(byte) => {
                let s = self.state(State::Byte {
                    byte,
                    out: StateIdx::NONE,
                });
                Fragment::new(s, self.list1(s, Slot::Out))
            }
            PostfixNode::Catenate => {
                let e2 = self.pop(position)?;
                let e1 = self.pop(position)?;
                self.patch(e1.out, e2.start);
                Fragment::new(e1.start, e2.out)
            }
            PostfixNode::Alternate => {
                let e2 = self.pop(position)?;
                let e1 = self.pop(position)?;
                let s = self.state(State::Split {
                    out: e1.start,
                    out1: e2.start,
                });
                Fragment::new(s, self.append(e1.out, e2.out))
            }
            PostfixNode::RepeatZeroOne => {
                let e = self.pop(position)?;
                let s = self.state(State::Split {
                    out: e.start,
                    out1: StateIdx::NONE,
                });
                let skip = self.list1(s, Slot::Out1);
                Fragment::new(s, self.append(e.out, skip))
            }
            PostfixNode::RepeatZeroPlus => {
                let e = self.pop(position)?;
                let s = self.state(State::Split {
                    out: e.start,
                    out1: StateIdx::NONE,
                });
                self.patch(e.out, s);
                Fragment::new(s, self.list1(s, Slot::Out1))
            }
            PostfixNode::RepeatOnePlus => {
                // The body must be traversed once before the loop choice,
                // so the fragment starts at the body, not at the split.
                let e = self.pop(position)?;
                let s = self.state(State::Split {
                    out: e.start,
                    out1: StateIdx::NONE,
                });
                self.patch(e.out, s);
                Fragment::new(e.start, self.list1(s, Slot::Out1))
            }
        };
        Ok(frag)
    }

    /// Compile `pattern` into a ready-to-match [`Regex`].
    pub fn build(&mut self, pattern: &str) -> Result<Regex, Error> {
        let postfix = Postfix::parse(pattern, &self.limits)?;
        trace!("pattern {:?} rewritten to postfix `{}`", pattern, postfix);
        self.build_postfix(&postfix)
    }

    /// Compile an already rewritten postfix stream into a [`Regex`].
    ///
    /// An empty stream is the empty pattern and yields an automaton that
    /// matches only the empty subject.
    pub fn build_postfix(&mut self, postfix: &Postfix) -> Result<Regex, Error> {
        // One state per non-`.` node plus the Match state.
        let operands = postfix
            .nodes()
            .iter()
            .filter(|&&node| node != PostfixNode::Catenate)
            .count();
        if operands > MAX_PATTERN_LEN {
            return Err(Error::PatternTooLong {
                len: operands,
                max: MAX_PATTERN_LEN,
            });
        }

        self.states.clear();
        self.frags.clear();
        self.patches.clear();

        for (position, &node) in postfix.nodes().iter().enumerate() {
            let frag = self.next_fragment(position, node)?;
            self.frags.push(frag);
        }

        let (start, match_state) = match self.frags.pop() {
            None => {
                let s = self.state(State::Match);
                (s, s)
            }
            Some(e) if self.frags.is_empty() => {
                let s = self.state(State::Match);
                self.patch(e.out, s);
                (e.start, s)
            }
            Some(_) => {
                return Err(Error::MalformedPostfix {
                    position: postfix.len(),
                });
            }
        };

        debug!(
            "built NFA with {} states from {} postfix nodes",
            self.states.len(),
            postfix.len()
        );

        Ok(Regex {
            states: StateList(self.states.to_vec().into_boxed_slice()),
            start,
            match_state,
            postfix: postfix.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Matcher (NFA simulation)
// ---------------------------------------------------------------------------

/// Reusable memory for [`Matcher`].  Create once, call
/// [`matcher`](Self::matcher) for each subject to match.
#[derive(Debug, Default)]
pub struct MatcherMemory {
    /// Per-state: the `listid` when the state was last added.  Used for
    /// O(1) deduplication in `addstate`.
    lastlist: Vec<usize>,
    /// Current and next state lists (swapped each step).
    clist: Vec<StateIdx>,
    nlist: Vec<StateIdx>,
    /// Work stack for the epsilon closure.
    stack: Vec<StateIdx>,
}

impl MatcherMemory {
    pub fn matcher<'a>(&'a mut self, regex: &'a Regex) -> Matcher<'a> {
        self.lastlist.clear();
        self.lastlist.resize(regex.states.len(), usize::MAX);
        self.clist.clear();
        self.nlist.clear();
        self.stack.clear();

        let mut m = Matcher {
            states: &regex.states,
            match_state: regex.match_state,
            lastlist: &mut self.lastlist,
            listid: 0,
            clist: &mut self.clist,
            nlist: &mut self.nlist,
            stack: &mut self.stack,
        };

        m.startlist(regex.start);
        m
    }
}

/// Runs a Thompson NFA simulation over one subject.
///
/// Bytes can be fed in any number of pieces with [`step`](Self::step) and
/// [`chunk`](Self::chunk); [`finish`](Self::finish) signals end-of-input.
#[derive(Debug)]
pub struct Matcher<'a> {
    states: &'a [State],
    match_state: StateIdx,
    /// Per-state deduplication stamp (compared against `listid`).
    lastlist: &'a mut [usize],
    /// Monotonically increasing step ID.
    listid: usize,
    /// Current active state list.  Holds only `Byte` and `Match` states.
    clist: &'a mut Vec<StateIdx>,
    /// Next active state list (built during a step).
    nlist: &'a mut Vec<StateIdx>,
    stack: &'a mut Vec<StateIdx>,
}

impl<'a> Matcher<'a> {
    /// Compute the initial state list by following all epsilon transitions
    /// from `start`.
    #[inline]
    fn startlist(&mut self, start: StateIdx) {
        self.addstate(start);
        std::mem::swap(self.clist, self.nlist);
        self.listid += 1;
    }

    /// Add `idx` and everything reachable from it through `Split` states
    /// to `nlist`.
    ///
    /// The closure is walked with an explicit stack so that deeply nested
    /// groups cannot overflow the call stack.  `out` is pushed last so it
    /// is explored first, keeping the classic left-to-right order.
    #[inline]
    fn addstate(&mut self, idx: StateIdx) {
        self.stack.push(idx);
        while let Some(idx) = self.stack.pop() {
            let i = idx.idx();
            if self.lastlist[i] == self.listid {
                continue;
            }
            self.lastlist[i] = self.listid;

            match self.states[idx] {
                State::Split { out, out1 } => {
                    self.stack.push(out1);
                    self.stack.push(out);
                }
                State::Byte { .. } | State::Match => self.nlist.push(idx),
            }
        }
    }

    /// Advance the simulation by one input byte.
    ///
    /// For each `Byte` state in `clist` whose label equals `b`, follow the
    /// `out` pointer through `addstate` to build the next `nlist`.
    pub fn step(&mut self, b: u8) {
        self.nlist.clear();
        let clist = std::mem::take(self.clist);

        for &idx in &clist {
            match self.states[idx] {
                State::Byte { byte, out } if byte == b => self.addstate(out),
                _ => {}
            }
        }

        *self.clist = std::mem::replace(self.nlist, clist);
        self.listid += 1;
    }

    /// Feed a byte slice through the matcher, one byte at a time.
    ///
    /// Stops early once the matcher [is dead](Self::is_dead): no further
    /// input can revive it.
    pub fn chunk(&mut self, input: &[u8]) {
        for &b in input {
            if self.is_dead() {
                break;
            }
            self.step(b);
        }
    }

    /// `true` once no state is active, i.e. no continuation of the input
    /// consumed so far can match.
    pub fn is_dead(&self) -> bool {
        self.clist.is_empty()
    }

    /// Whether the input consumed so far matches the pattern.
    pub fn ismatch(&self) -> bool {
        self.clist.contains(&self.match_state)
    }

    /// Signal end-of-input and return the final match result.
    ///
    /// Consumes the matcher, since no further input can be fed after
    /// end-of-input has been signalled.
    pub fn finish(self) -> bool {
        self.ismatch()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
