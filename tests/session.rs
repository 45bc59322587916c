mod common;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use common::{scripted_session, sent_payloads, TestHost};
use dbgp_engine::session::{
    is_session_active_for_current_process, LoopExit, LoopMode, StreamAction, StreamChannel,
};
use serial_test::serial;

fn expected_id(sequence: i64) -> i64 {
    ((std::process::id() as i64) & 0x1ffff) * 10000 + sequence
}

#[test]
fn test_breakpoint_set_list_remove_round_trip() {
    let id = expected_id(1);
    let set = "breakpoint_set -i 1 -t line -f file:///work/test_app.rs -n 10".to_string();
    let list = "breakpoint_list -i 2".to_string();
    let remove = format!("breakpoint_remove -i 3 -d {id}");
    let get_after = format!("breakpoint_get -i 4 -d {id}");

    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&[&set, &list, &remove, &get_after]);

    let exit = session.command_loop(&mut host, LoopMode::RunOut).unwrap();
    assert_eq!(exit, LoopExit::Disconnected);

    let payloads = sent_payloads(&sent);
    assert_eq!(payloads.len(), 4);

    // set: echoes command/transaction and reports the pid-derived id.
    assert!(payloads[0].contains("command=\"breakpoint_set\""));
    assert!(payloads[0].contains("transaction_id=\"1\""));
    assert!(payloads[0].contains(&format!("id=\"{id}\"")));

    // list: exactly one breakpoint child with matching id, type and state.
    let list_payload = &payloads[1];
    assert_eq!(list_payload.matches("<breakpoint").count(), 1);
    assert!(list_payload.contains("type=\"line\""));
    assert!(list_payload.contains("state=\"enabled\""));
    assert!(list_payload.contains(&format!("id=\"{id}\"")));
    assert!(list_payload.contains("lineno=\"10\""));

    // remove answers with the removed breakpoint, then the id is gone.
    assert!(payloads[2].contains("<breakpoint"));
    assert!(payloads[3].contains("<error code=\"205\""));
    assert!(payloads[3].contains("no such breakpoint"));
    assert!(session.breakpoints.is_empty());
}

#[test]
fn test_breakpoint_list_covers_every_kind_once() {
    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&[
        "breakpoint_set -i 1 -t line -f file:///work/test_app.rs -n 10",
        "breakpoint_set -i 2 -t call -m advance -a Parser",
        "breakpoint_set -i 3 -t exception -x ValueError",
        "breakpoint_list -i 4",
    ]);
    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    let payloads = sent_payloads(&sent);
    let list = &payloads[3];
    assert_eq!(list.matches("<breakpoint").count(), 3);
    assert!(list.contains("type=\"line\""));
    assert!(list.contains("type=\"call\""));
    assert!(list.contains("type=\"exception\""));
    for sequence in 1..=3 {
        assert!(list.contains(&format!("id=\"{}\"", expected_id(sequence))));
    }
}

#[test]
fn test_stack_commands() {
    let mut host = TestHost::default();
    host.current_line = 12;
    let (mut session, sent) = scripted_session(&[
        "stack_depth -i 1",
        "stack_get -i 2",
        "stack_get -i 3 -d 5",
    ]);
    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    let payloads = sent_payloads(&sent);
    assert!(payloads[0].contains("depth=\"1\""));

    assert!(payloads[1].contains("<stack"));
    assert!(payloads[1].contains("where=\"{main}\""));
    assert!(payloads[1].contains("level=\"0\""));
    assert!(payloads[1].contains("type=\"file\""));
    assert!(payloads[1].contains("filename=\"file:///work/test_app.rs\""));
    assert!(payloads[1].contains("lineno=\"12\""));

    assert!(payloads[2].contains("<error code=\"301\""));
}

#[test]
fn test_missing_required_option_is_invalid_args_and_no_partial_state() {
    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&[
        // No -t at all.
        "breakpoint_set -i 1",
        // Line type without -n.
        "breakpoint_set -i 2 -t line -f file:///work/test_app.rs",
    ]);

    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    let payloads = sent_payloads(&sent);
    assert!(payloads[0].contains("<error code=\"3\""));
    assert!(payloads[1].contains("<error code=\"3\""));
    // Nothing may stick: no admin entry, no half-registered record.
    assert!(session.breakpoints.is_empty());
    assert_eq!(session.breakpoints.line_breakpoints().count(), 0);
}

#[test]
fn test_watch_type_not_supported() {
    let mut host = TestHost::default();
    let (mut session, sent) =
        scripted_session(&["breakpoint_set -i 1 -t watch -f file:///x.rs -n 1"]);
    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    assert!(sent_payloads(&sent)[0].contains("<error code=\"201\""));
    assert!(session.breakpoints.is_empty());
}

#[test]
fn test_breakpoint_update_retargets_line() {
    let id = expected_id(1);
    let set = "breakpoint_set -i 1 -t line -f file:///work/test_app.rs -n 10".to_string();
    let update = format!("breakpoint_update -i 2 -d {id} -n 12 -s disabled");
    let get = format!("breakpoint_get -i 3 -d {id}");

    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&[&set, &update, &get]);
    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    let payloads = sent_payloads(&sent);
    assert!(payloads[1].contains("lineno=\"12\""));
    assert!(payloads[1].contains("state=\"disabled\""));
    // The record is still addressable under the same admin id.
    assert!(payloads[2].contains("lineno=\"12\""));
}

#[test]
fn test_eval_round_trip() {
    let mut host = TestHost::default();
    // base64("1+1")
    let (mut session, sent) = scripted_session(&["eval -i 5 -- MSsx"]);
    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    let payload = &sent_payloads(&sent)[0];
    assert!(payload.contains("command=\"eval\""));
    assert!(payload.contains("transaction_id=\"5\""));
    assert!(payload.contains("type=\"int\""));
    // The value node carries base64("2").
    assert!(payload.contains(&BASE64.encode("2")));
}

#[test]
fn test_eval_failure_is_error_206() {
    let mut host = TestHost::default();
    let encoded = BASE64.encode("no_such_thing");
    let command = format!("eval -i 6 -- {encoded}");
    let (mut session, sent) = scripted_session(&[&command]);
    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    assert!(sent_payloads(&sent)[0].contains("<error code=\"206\""));
    // The notification hold taken around the evaluation is released again.
    assert!(!session.features.inhibit_notifications);
}

#[test]
#[serial]
fn test_post_mortem_gate_after_stop() {
    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&[
        "stop -i 1",
        "stack_get -i 2",
        "status -i 3",
        "breakpoint_list -i 4",
    ]);

    let exit = session
        .command_loop(&mut host, LoopMode::TerminateOnStop)
        .unwrap();
    // Stopped session, client hung up, must-terminate loop: the host exits.
    assert_eq!(exit, LoopExit::Terminate);

    let payloads = sent_payloads(&sent);
    assert!(payloads[0].contains("status=\"stopped\""));
    // stack_get is not post-mortem-safe.
    assert!(payloads[1].contains("<error code=\"5\""));
    assert!(payloads[1].contains("command is not available"));
    // status and breakpoint_list are.
    assert!(payloads[2].contains("status=\"stopped\""));
    assert!(!payloads[3].contains("<error"));
}

#[test]
fn test_continuation_response_is_deferred_until_break() {
    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&["run -i 4"]);

    let exit = session
        .command_loop(&mut host, LoopMode::TerminateOnStop)
        .unwrap();
    assert_eq!(exit, LoopExit::Resume);
    // Nothing went out yet: the answer to `run` waits for the next
    // suspension.
    assert!(sent.borrow().is_empty());

    session
        .report_break(&mut host, Some("/work/test_app.rs"), Some(10), None)
        .unwrap();

    let payloads = sent_payloads(&sent);
    assert!(payloads[0].contains("command=\"run\""));
    assert!(payloads[0].contains("transaction_id=\"4\""));
    assert!(payloads[0].contains("status=\"break\""));
    assert!(payloads[0].contains("reason=\"ok\""));
    assert!(payloads[0].contains("filename=\"file:///work/test_app.rs\""));
    assert!(payloads[0].contains("lineno=\"10\""));
}

#[test]
fn test_unknown_command_and_parse_errors() {
    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&[
        "warble -i 9",
        // Parse error, transaction id recovered from the prefix.
        "eval -i 7 -n \"never closed",
        // Parse error and no transaction id degrade to invalid options.
        "run extra",
    ]);

    let exit = session.command_loop(&mut host, LoopMode::RunOut).unwrap();
    // Protocol errors never end the loop (nor the session).
    assert_eq!(exit, LoopExit::Disconnected);

    let payloads = sent_payloads(&sent);
    assert!(payloads[0].contains("<error code=\"4\""));
    assert!(payloads[1].contains("transaction_id=\"7\""));
    assert!(payloads[1].contains("<error code=\"1\""));
    assert!(payloads[2].contains("command=\"run\""));
    assert!(!payloads[2].contains("transaction_id"));
    assert!(payloads[2].contains("<error code=\"3\""));
}

#[test]
fn test_duplicate_option_is_error_2() {
    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&["status -i 1 -i 2"]);
    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    assert!(sent_payloads(&sent)[0].contains("<error code=\"2\""));
}

#[test]
fn test_stream_redirection_modes() {
    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&["stdout -i 1 -c 2"]);
    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    assert!(sent_payloads(&sent)[0].contains("success=\"1\""));

    // Redirect mode: chunk goes to the client, host must suppress its own
    // write.
    let action = session.stream_output(StreamChannel::Stdout, b"hello");
    assert_eq!(action, StreamAction::Suppress);
    let payloads = sent_payloads(&sent);
    let stream = payloads.last().unwrap();
    assert!(stream.contains("<stream"));
    assert!(stream.contains("type=\"stdout\""));
    assert!(stream.contains(&BASE64.encode("hello")));

    // stderr is never redirected.
    let before = sent.borrow().len();
    let action = session.stream_output(StreamChannel::Stderr, b"oops");
    assert_eq!(action, StreamAction::Forward);
    assert_eq!(sent.borrow().len(), before);
}

#[test]
fn test_resolved_breakpoint_notification_on_set() {
    let mut host = TestHost::default();
    // Line 4 carries no statement; the nearest executable line forward is 5.
    let (mut session, sent) = scripted_session(&[
        "feature_set -i 1 -n resolved_breakpoints -v 1",
        "breakpoint_set -i 2 -t line -f file:///work/test_app.rs -n 4",
    ]);
    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    let payloads = sent_payloads(&sent);
    assert_eq!(payloads.len(), 3);

    // The notification precedes the breakpoint_set response.
    assert!(payloads[1].contains("<notify"));
    assert!(payloads[1].contains("name=\"breakpoint_resolved\""));
    assert!(payloads[1].contains("resolved=\"resolved\""));
    assert!(payloads[1].contains("lineno=\"5\""));

    assert!(payloads[2].contains("command=\"breakpoint_set\""));
    assert!(payloads[2].contains("resolved=\"resolved\""));
}

#[test]
fn test_conditional_and_hit_count_breakpoints() {
    let mut host = TestHost::default();
    let condition = BASE64.encode("0");
    let with_condition = format!(
        "breakpoint_set -i 1 -t conditional -f file:///work/test_app.rs -n 10 -- {condition}"
    );
    let with_hits =
        "breakpoint_set -i 2 -t line -f file:///work/test_app.rs -n 20 -o == -h 3".to_string();

    let (mut session, _sent) = scripted_session(&[&with_condition, &with_hits]);
    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    // The condition evaluates falsy: never breaks.
    assert!(!session.should_break_here(&mut host, "/work/test_app.rs", 10));
    assert!(!session.should_break_here(&mut host, "/work/test_app.rs", 10));

    // hit_condition ==3: fires exactly on the third hit.
    assert!(!session.should_break_here(&mut host, "/work/test_app.rs", 20));
    assert!(!session.should_break_here(&mut host, "/work/test_app.rs", 20));
    assert!(session.should_break_here(&mut host, "/work/test_app.rs", 20));
    assert!(!session.should_break_here(&mut host, "/work/test_app.rs", 20));
}

#[test]
fn test_source_of_registered_eval_code() {
    let mut host = TestHost::default();
    let contents = "x = 1\ny = 2\nz = 3";

    let (mut session, sent) = scripted_session(&[
        "source -i 1 -f dbgp://1",
        "source -i 2 -f dbgp://1 -b 1 -e 2",
        "source -i 3 -f dbgp://99",
    ]);
    let id = session.register_eval_code("/work/test_app.rs", 12, contents);
    assert_eq!(id, 1);

    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    let payloads = sent_payloads(&sent);
    assert!(payloads[0].contains(&BASE64.encode(contents)));
    assert!(payloads[1].contains(&BASE64.encode("y = 2\nz = 3")));
    assert!(payloads[2].contains("<error code=\"100\""));
}

#[test]
fn test_property_and_context_commands() {
    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&[
        "context_names -i 1",
        "context_get -i 2 -c 0 -d 0",
        "property_get -i 3 -n counter",
        "property_get -i 4 -n missing_one",
        "property_value -i 5 -n name -m 3",
        "property_set -i 6 -n counter -- NDI=", // base64("42")
        "property_get -i 7 -n counter -c 9",
    ]);
    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    let payloads = sent_payloads(&sent);

    assert!(payloads[0].contains("name=\"Locals\""));
    assert!(payloads[0].contains("name=\"Globals\""));
    assert!(payloads[0].contains("id=\"2\""));

    // Both declared variables come back as properties.
    assert!(payloads[1].contains("name=\"counter\""));
    assert!(payloads[1].contains("name=\"name\""));
    assert!(payloads[1].contains("context=\"0\""));

    assert!(payloads[2].contains("type=\"int\""));
    assert!(payloads[2].contains(&BASE64.encode("7")));

    assert!(payloads[3].contains("<error code=\"300\""));

    // max_data=3 truncates "session" to "ses"; size reports the full
    // length.
    assert!(payloads[4].contains("size=\"7\""));
    assert!(payloads[4].contains(&BASE64.encode("ses")));

    assert!(payloads[5].contains("success=\"1\""));
    assert_eq!(
        host.variables.get("counter"),
        Some(&dbgp_engine::host::Value::Int(42))
    );

    // Invalid context id.
    assert!(payloads[6].contains("<error code=\"3\""));
}

#[test]
fn test_feature_get_matrix() {
    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&[
        "feature_get -i 1 -n breakpoint_types",
        "feature_get -i 2 -n language_name",
        "feature_get -i 3 -n unknown_thing",
        "feature_get -i 4 -n breakpoint_set",
        "feature_set -i 5 -n encoding -v utf-8",
    ]);
    session.command_loop(&mut host, LoopMode::RunOut).unwrap();

    let payloads = sent_payloads(&sent);
    assert!(payloads[0].contains("line conditional call return exception"));
    assert!(payloads[0].contains("supported=\"1\""));
    assert!(payloads[1].contains("toyscript"));
    assert!(payloads[2].contains("supported=\"0\""));
    // Command names answer "supported".
    assert!(payloads[3].contains("supported=\"1\""));
    // Only iso-8859-1 is acceptable.
    assert!(payloads[4].contains("<error code=\"900\""));
}

#[test]
#[serial]
fn test_detach_tears_down_and_reports_stopped() {
    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&["detach -i 1", "status -i 2"]);

    let exit = session
        .command_loop(&mut host, LoopMode::TerminateOnStop)
        .unwrap();
    // Detach ends the loop; the command after it is never read.
    assert_eq!(exit, LoopExit::Disconnected);

    let payloads = sent_payloads(&sent);
    assert_eq!(payloads.len(), 1);
    assert!(payloads[0].contains("command=\"detach\""));
    assert!(payloads[0].contains("status=\"stopped\""));
}

#[test]
#[serial]
fn test_init_handshake_and_deinit() {
    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&["run -i 1"]);

    let exit = session
        .init(&mut host, dbgp_engine::session::ConnectTrigger::Request)
        .unwrap();
    assert_eq!(exit, LoopExit::Resume);
    assert!(is_session_active_for_current_process());

    let payloads = sent_payloads(&sent);
    let init = &payloads[0];
    assert!(init.starts_with("<?xml"));
    assert!(init.contains("<init"));
    assert!(init.contains("fileuri=\"file:///work/test_app.rs\""));
    assert!(init.contains("language=\"toyscript\""));
    assert!(init.contains("protocol_version=\"1.0\""));
    assert!(init.contains(&format!("appid=\"{}\"", std::process::id())));
    assert!(init.contains("<engine"));

    // End of request: stopping response, post-mortem run-out, teardown.
    session.deinit(&mut host).unwrap();
    assert!(!is_session_active_for_current_process());

    let payloads = sent_payloads(&sent);
    let last = payloads.last().unwrap();
    assert!(last.contains("status=\"stopping\""));
    assert!(last.contains("command=\"run\""));
}

#[test]
#[serial]
fn test_error_report_enters_post_mortem() {
    let mut host = TestHost::default();
    let (mut session, sent) = scripted_session(&["stack_get -i 1", "status -i 2"]);

    let report = dbgp_engine::session::ErrorReport {
        exception: None,
        code: 1,
        message: "something irreparable".to_string(),
        fatal: true,
    };
    session.report_error(&mut host, &report).unwrap();

    let payloads = sent_payloads(&sent);
    assert!(payloads[0].contains("status=\"stopping\""));
    assert!(payloads[0].contains("reason=\"aborted\""));
    assert!(payloads[0].contains("something irreparable"));
    // Post-mortem: stack_get refused, status still served.
    assert!(payloads[1].contains("<error code=\"5\""));
    assert!(payloads[2].contains("status=\"stopping\""));
}
