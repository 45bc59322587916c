pub mod resolve;
pub mod store;

use crate::host::{LineNo, LineSpan};
use crate::protocol::path_to_url;
use crate::protocol::xml::Node;
use strum_macros::{Display, EnumString, IntoStaticStr};

pub use store::{AdminEntry, BreakpointStore};

/// Client-visible breakpoint id.
pub type BreakpointId = i64;

/// Breakpoint kinds of the protocol. `Watch` is recognized but rejected at
/// registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
pub enum BreakpointKind {
    #[strum(serialize = "line")]
    Line,
    #[strum(serialize = "conditional")]
    Conditional,
    #[strum(serialize = "call")]
    Call,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "exception")]
    Exception,
    #[strum(serialize = "watch")]
    Watch,
}

/// Hit-count firing policy against the configured hit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
pub enum HitCondition {
    #[default]
    #[strum(serialize = "disabled")]
    Disabled,
    #[strum(serialize = ">=")]
    GreaterOrEqual,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "%")]
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    #[default]
    Unresolved,
    Resolved,
}

/// Span sentinel a fresh (or re-targeted) breakpoint starts from: wider than
/// anything a code unit can report, so the first real match always wins.
pub fn unresolved_span() -> LineSpan {
    LineSpan::new(-1, i64::MAX)
}

/// The full record of one breakpoint.
#[derive(Debug, Clone)]
pub struct BrkInfo {
    pub id: BreakpointId,
    pub kind: BreakpointKind,
    pub resolved: Resolution,
    /// Narrowest code-unit span that justified the current resolution.
    pub resolved_span: LineSpan,
    pub file: Option<String>,
    /// Line requested by the client.
    pub original_lineno: LineNo,
    /// Line the breakpoint actually fires on, once resolved.
    pub resolved_lineno: LineNo,
    pub class: Option<String>,
    pub function: Option<String>,
    pub exception: Option<String>,
    pub condition: Option<String>,
    pub disabled: bool,
    pub temporary: bool,
    pub hit_count: i64,
    pub hit_value: i64,
    pub hit_condition: HitCondition,
}

impl BrkInfo {
    pub fn new(kind: BreakpointKind) -> Self {
        Self {
            id: -1,
            kind,
            resolved: Resolution::Unresolved,
            resolved_span: unresolved_span(),
            file: None,
            original_lineno: 0,
            resolved_lineno: 0,
            class: None,
            function: None,
            exception: None,
            condition: None,
            disabled: false,
            temporary: false,
            hit_count: 0,
            hit_value: 0,
            hit_condition: HitCondition::default(),
        }
    }

    /// Re-target a line breakpoint: resolution starts over.
    pub fn set_lineno(&mut self, lineno: LineNo) {
        self.original_lineno = lineno;
        self.resolved_lineno = lineno;
        self.resolved = Resolution::Unresolved;
        self.resolved_span = unresolved_span();
    }

    pub fn state_attribute(&self) -> &'static str {
        if self.temporary {
            "temporary"
        } else if self.disabled {
            "disabled"
        } else {
            "enabled"
        }
    }

    /// Hit-count policy. A temporary breakpoint self-disables after its
    /// first evaluation whatever the outcome, and the counter always
    /// increments.
    pub fn should_break(&mut self) -> bool {
        if self.temporary {
            self.disabled = true;
        }
        self.hit_count += 1;

        if self.hit_value == 0 {
            return true;
        }
        match self.hit_condition {
            HitCondition::Disabled => true,
            HitCondition::GreaterOrEqual => self.hit_count >= self.hit_value,
            HitCondition::Equal => self.hit_count == self.hit_value,
            HitCondition::Mod => self.hit_count % self.hit_value == 0,
        }
    }

    /// `<breakpoint ...>` element describing this record, as used by the
    /// breakpoint commands and the resolved notification.
    pub fn as_xml(&self, report_resolved: bool) -> Node {
        let mut node = Node::new("breakpoint");
        node.attr("type", <&'static str>::from(self.kind));
        if report_resolved {
            node.attr(
                "resolved",
                match self.resolved {
                    Resolution::Resolved => "resolved",
                    Resolution::Unresolved => "unresolved",
                },
            );
        }
        if let Some(file) = &self.file {
            node.attr("filename", path_to_url(file));
        }
        if self.resolved_lineno != 0 {
            node.attr("lineno", self.resolved_lineno.to_string());
        }
        if let Some(function) = &self.function {
            node.attr("function", function.clone());
        }
        if let Some(class) = &self.class {
            node.attr("class", class.clone());
        }
        if let Some(exception) = &self.exception {
            node.attr("exception", exception.clone());
        }
        node.attr("state", self.state_attribute());
        node.attr("hit_count", self.hit_count.to_string());
        if self.hit_condition != HitCondition::Disabled {
            node.attr("hit_condition", self.hit_condition.to_string());
        }
        node.attr("hit_value", self.hit_value.to_string());
        node.attr("id", self.id.to_string());
        if let Some(condition) = &self.condition {
            let mut expression = Node::new("expression");
            expression.set_text(condition.clone());
            node.add_child(expression);
        }
        node
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hit_conditions() {
        struct TestCase {
            hit_value: i64,
            hit_condition: HitCondition,
            // outcome of should_break for hits 1..=6
            expected: [bool; 6],
        }

        let cases = [
            TestCase {
                hit_value: 3,
                hit_condition: HitCondition::Equal,
                expected: [false, false, true, false, false, false],
            },
            TestCase {
                hit_value: 3,
                hit_condition: HitCondition::GreaterOrEqual,
                expected: [false, false, true, true, true, true],
            },
            TestCase {
                hit_value: 3,
                hit_condition: HitCondition::Mod,
                expected: [false, false, true, false, false, true],
            },
            TestCase {
                hit_value: 0,
                hit_condition: HitCondition::Disabled,
                expected: [true; 6],
            },
            // hit_value 0 fires always even with an operator configured
            TestCase {
                hit_value: 0,
                hit_condition: HitCondition::Equal,
                expected: [true; 6],
            },
        ];

        for tc in cases {
            let mut brk = BrkInfo::new(BreakpointKind::Line);
            brk.hit_value = tc.hit_value;
            brk.hit_condition = tc.hit_condition;
            for (nr, expected) in tc.expected.iter().enumerate() {
                assert_eq!(
                    brk.should_break(),
                    *expected,
                    "hit {} with value {} and {:?}",
                    nr + 1,
                    tc.hit_value,
                    tc.hit_condition,
                );
            }
            assert_eq!(brk.hit_count, 6);
        }
    }

    #[test]
    fn test_temporary_breakpoint_self_disables() {
        let mut brk = BrkInfo::new(BreakpointKind::Line);
        brk.temporary = true;

        assert!(brk.should_break());
        assert!(brk.disabled);
    }

    #[test]
    fn test_hit_condition_strings() {
        assert_eq!(HitCondition::GreaterOrEqual.to_string(), ">=");
        assert_eq!(">=".parse::<HitCondition>().unwrap(), HitCondition::GreaterOrEqual);
        assert_eq!("==".parse::<HitCondition>().unwrap(), HitCondition::Equal);
        assert_eq!("%".parse::<HitCondition>().unwrap(), HitCondition::Mod);
        assert!("!=".parse::<HitCondition>().is_err());
    }

    #[test]
    fn test_state_attribute() {
        let mut brk = BrkInfo::new(BreakpointKind::Line);
        assert_eq!(brk.state_attribute(), "enabled");
        brk.disabled = true;
        assert_eq!(brk.state_attribute(), "disabled");
        brk.temporary = true;
        assert_eq!(brk.state_attribute(), "temporary");
    }

    #[test]
    fn test_breakpoint_xml_view() {
        let mut brk = BrkInfo::new(BreakpointKind::Line);
        brk.id = 123450001;
        brk.file = Some("/src/app.rs".to_string());
        brk.set_lineno(10);

        let node = brk.as_xml(true);
        let rendered = node.render();
        assert!(rendered.contains("type=\"line\""));
        assert!(rendered.contains("resolved=\"unresolved\""));
        assert!(rendered.contains("filename=\"file:///src/app.rs\""));
        assert!(rendered.contains("lineno=\"10\""));
        assert!(rendered.contains("id=\"123450001\""));

        let node = brk.as_xml(false);
        assert!(node.get_attr("resolved").is_none());
    }
}
