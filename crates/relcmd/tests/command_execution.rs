//! Execution and resource discipline of relational commands.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use asupersync::{Cx, Outcome};
use common::{MockConfig, MockTransaction, connection, request, runtime, unwrap_outcome};
use relcmd::{
    CommandErrorEventData, CommandInterceptor, DbType, DiagnosticsLogger, DiagnosticsOptions,
    Error, IsolationLevel, ParameterValues, RelationalCommand, RelationalCommandBuilder,
    RelationalCommandTemplate, RelationalConnection, RelationalParameter, TypeMapping, Value,
};
use relcmd_core::ParameterErrorKind;

fn values(pairs: &[(&str, Value)]) -> ParameterValues {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect::<HashMap<_, _>>()
}

/// Records error events in the driver log.
struct FailureLog {
    state: Arc<common::MockState>,
}

impl CommandInterceptor<common::MockDb> for FailureLog {
    fn command_failed(&self, _command: &common::MockCommand, _event: &CommandErrorEventData, error: &Error) {
        self.state.record(format!("failed:{error}"));
    }
}

#[test]
fn test_missing_parameter_fails_before_touching_the_driver() {
    let (state, conn) = connection(MockConfig::default());
    let command: RelationalCommand<common::MockDb> = RelationalCommand::new(
        "UPDATE heroes SET age = @age WHERE id = @id",
        vec![RelationalParameter::new("age"), RelationalParameter::new("id")],
    );
    let supplied = values(&[("age", Value::Int(30))]);
    let req = request(&conn).with_parameter_values(&supplied);

    match command.execute_non_query(&req) {
        Err(Error::Parameter(e)) => {
            assert_eq!(e.kind, ParameterErrorKind::Missing);
            assert_eq!(e.parameter, "id");
        }
        other => panic!("expected missing parameter, got {other:?}"),
    }
    assert_eq!(state.commands_created(), 0);
    assert_eq!(state.opens(), 0);
    assert!(state.log().is_empty());
}

#[test]
fn test_no_values_reports_first_declared_parameter() {
    let (_state, conn) = connection(MockConfig::default());
    let command: RelationalCommand<common::MockDb> = RelationalCommand::new(
        "SELECT @a, @b",
        vec![RelationalParameter::new("a"), RelationalParameter::new("b")],
    );
    match command.execute_scalar(&request(&conn)) {
        Err(Error::Parameter(e)) => assert_eq!(e.parameter, "a"),
        other => panic!("expected missing parameter, got {other:?}"),
    }
}

#[test]
fn test_non_query_releases_command_and_connection_once() {
    let (state, conn) = connection(MockConfig {
        rows_affected: 3,
        ..MockConfig::default()
    });
    let command: RelationalCommand<common::MockDb> =
        RelationalCommand::new("DELETE FROM heroes", Vec::new());

    let rows = command.execute_non_query(&request(&conn)).expect("non query");
    assert_eq!(rows, 3);
    assert_eq!(
        state.log(),
        vec!["create_command", "open", "execute:non_query", "dispose", "close"]
    );
    assert_eq!(state.disposals(), 1);
    assert_eq!(state.closes(), 1);
    assert!(!conn.is_open());
    assert_eq!(conn.open_count(), 0);
}

#[test]
fn test_update_without_logger_returns_native_count() {
    let (state, conn) = connection(MockConfig {
        rows_affected: 4,
        ..MockConfig::default()
    });
    let command: RelationalCommand<common::MockDb> =
        RelationalCommand::new("UPDATE t SET x=@p", vec![RelationalParameter::new("@p")]);
    let supplied = values(&[("@p", Value::Int(5))]);

    let rows = command
        .execute_non_query(&request(&conn).with_parameter_values(&supplied))
        .expect("update");
    assert_eq!(rows, 4);
    let snapshot = state.last_command().expect("executed command");
    assert_eq!(snapshot.parameters[0].value, Value::Int(5));
    assert_eq!(snapshot.parameters[0].db_type, Some(DbType::Int32));
    assert_eq!(state.closes(), 1);
    assert!(!conn.is_open());
}

#[test]
fn test_failed_execution_still_releases_resources() {
    let (state, conn) = connection(MockConfig {
        fail_execute: true,
        ..MockConfig::default()
    });
    let command: RelationalCommand<common::MockDb> = RelationalCommand::new("SELEC 1", Vec::new());

    let err = command
        .execute_non_query(&request(&conn))
        .expect_err("driver error");
    assert!(matches!(err, Error::Command(_)));
    assert_eq!(state.disposals(), 1);
    assert_eq!(state.closes(), 1);
    assert!(!conn.is_open());
}

#[test]
fn test_open_failure_disposes_command_without_closing() {
    let (state, conn) = connection(MockConfig {
        fail_open: true,
        ..MockConfig::default()
    });
    let command: RelationalCommand<common::MockDb> = RelationalCommand::new("SELECT 1", Vec::new());

    let err = command
        .execute_scalar(&request(&conn))
        .expect_err("open error");
    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(state.executions(), 0);
    assert_eq!(state.disposals(), 1);
    assert_eq!(state.closes(), 0);
}

#[test]
fn test_connection_opened_by_caller_stays_open() {
    let (state, conn) = connection(MockConfig::default());
    assert!(conn.open().expect("open"));
    let command: RelationalCommand<common::MockDb> = RelationalCommand::new("SELECT 1", Vec::new());

    command.execute_non_query(&request(&conn)).expect("non query");
    command.execute_non_query(&request(&conn)).expect("non query");
    assert_eq!(state.opens(), 1);
    assert_eq!(state.closes(), 0);
    assert_eq!(conn.open_count(), 1);

    conn.close().expect("close");
    assert_eq!(state.closes(), 1);
}

#[test]
fn test_scalar_distinguishes_no_rows_from_null() {
    let (state, conn) = connection(MockConfig::default());
    let command: RelationalCommand<common::MockDb> =
        RelationalCommand::new("SELECT name FROM heroes", Vec::new());
    assert_eq!(command.execute_scalar(&request(&conn)).expect("scalar"), None);

    *state.config.lock().expect("config") = MockConfig {
        scalar: Some(Value::Null),
        ..MockConfig::default()
    };
    assert_eq!(
        command.execute_scalar(&request(&conn)).expect("scalar"),
        Some(Value::Null)
    );
}

#[test]
fn test_parameters_are_bound_with_type_mapping() {
    let (state, conn) = connection(MockConfig::default());
    let command: RelationalCommand<common::MockDb> = RelationalCommand::new(
        "UPDATE heroes SET name = @p0, note = @p1 WHERE id = @p2",
        vec![
            RelationalParameter::type_mapped(
                "name",
                "@p0",
                Some(TypeMapping::string("nvarchar(64)", Some(64))),
                Some(false),
            ),
            RelationalParameter::type_mapped("note", "@p1", None, None),
            RelationalParameter::type_mapped("id", "@p2", Some(TypeMapping::int("int")), None),
        ],
    );
    let supplied = values(&[
        ("name", Value::Text("Deadpond".into())),
        ("note", Value::Null),
        ("id", Value::Int(7)),
    ]);
    command
        .execute_non_query(&request(&conn).with_parameter_values(&supplied))
        .expect("non query");

    let snapshot = state.last_command().expect("executed command");
    assert_eq!(snapshot.parameters.len(), 3);
    let name = &snapshot.parameters[0];
    assert_eq!(name.name, "@p0");
    assert_eq!(name.db_type, Some(DbType::String));
    assert_eq!(name.size, Some(64));
    assert!(!name.is_nullable);
    let note = &snapshot.parameters[1];
    assert_eq!(note.db_type, None);
    assert!(note.is_nullable);
    assert_eq!(snapshot.parameters[2].db_type, Some(DbType::Int32));
}

#[test]
fn test_composite_parameter_expands_positionally() {
    let (state, conn) = connection(MockConfig::default());
    let command: RelationalCommand<common::MockDb> = RelationalCommand::new(
        "SELECT * FROM heroes WHERE id IN (@ids0, @ids1)",
        vec![RelationalParameter::composite(
            "ids",
            vec![
                RelationalParameter::new("@ids0"),
                RelationalParameter::new("@ids1"),
            ],
        )],
    );
    let supplied = values(&[("ids", Value::Array(vec![Value::Int(1), Value::BigInt(2)]))]);
    command
        .execute_non_query(&request(&conn).with_parameter_values(&supplied))
        .expect("non query");

    let snapshot = state.last_command().expect("executed command");
    let names: Vec<_> = snapshot.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["@ids0", "@ids1"]);
    assert_eq!(snapshot.parameters[1].value, Value::BigInt(2));
}

#[test]
fn test_composite_arity_mismatch_disposes_command() {
    let (state, conn) = connection(MockConfig::default());
    let command: RelationalCommand<common::MockDb> = RelationalCommand::new(
        "SELECT 1",
        vec![RelationalParameter::composite(
            "pair",
            vec![RelationalParameter::new("a"), RelationalParameter::new("b")],
        )],
    );
    let supplied = values(&[("pair", Value::Array(vec![Value::Int(1)]))]);
    let logger = DiagnosticsLogger::<common::MockDb>::new(DiagnosticsOptions::default())
        .with_command_interceptor(FailureLog {
            state: Arc::clone(&state),
        });
    let req = request(&conn)
        .with_parameter_values(&supplied)
        .with_logger(Some(Arc::new(logger)));

    match command.execute_non_query(&req) {
        Err(Error::Parameter(e)) => assert_eq!(e.kind, ParameterErrorKind::Mismatch),
        other => panic!("expected mismatch, got {other:?}"),
    }
    assert_eq!(state.disposals(), 1);
    assert_eq!(state.opens(), 0);

    let log = state.log();
    let failed = log
        .iter()
        .position(|entry| entry.starts_with("failed:"))
        .expect("error hook fired");
    let disposed = log.iter().position(|entry| entry == "dispose").expect("disposed");
    assert!(failed < disposed);
    assert!(!log.contains(&"close".to_string()));
}

#[test]
fn test_timeout_and_ambient_transaction_are_applied() {
    let state = common::MockState::new(MockConfig::default());
    let conn = RelationalConnection::new(common::MockDb::new(&state))
        .with_command_timeout(Duration::from_secs(30))
        .into_shared();
    let command: RelationalCommand<common::MockDb> = RelationalCommand::new("SELECT 1", Vec::new());

    command.execute_non_query(&request(&conn)).expect("non query");
    let snapshot = state.last_command().expect("executed command");
    assert_eq!(snapshot.timeout, Some(Duration::from_secs(30)));
    assert!(!snapshot.has_transaction);

    let external = Arc::new(MockTransaction::new(&state, IsolationLevel::ReadCommitted));
    let mut transaction = conn.use_transaction(external).expect("use transaction");
    command.execute_non_query(&request(&conn)).expect("non query");
    assert!(state.last_command().expect("executed command").has_transaction);

    transaction.dispose().expect("dispose");
    command.execute_non_query(&request(&conn)).expect("non query");
    assert!(!state.last_command().expect("executed command").has_transaction);
}

#[test]
fn test_builder_output_executes() {
    let (state, conn) = connection(MockConfig {
        rows_affected: 1,
        ..MockConfig::default()
    });
    let mut builder = RelationalCommandBuilder::new();
    builder
        .append_line("INSERT INTO heroes (name)")
        .append("VALUES (@name)")
        .add_parameter(RelationalParameter::type_mapped("name", "@name", None, None));
    let mut command: RelationalCommand<common::MockDb> = builder.build().expect("valid command");
    let supplied = values(&[("name", Value::Text("Spider-Boy".into()))]);

    assert_eq!(
        command
            .execute_non_query(&request(&conn).with_parameter_values(&supplied))
            .expect("insert"),
        1
    );
    assert_eq!(
        state.last_command().expect("executed command").text,
        "INSERT INTO heroes (name)\nVALUES (@name)"
    );

    let mut other = RelationalCommandBuilder::new();
    other.append("DELETE FROM heroes");
    command.populate_from(&other);
    assert_eq!(command.command_text(), "DELETE FROM heroes");
    assert!(command.parameters().is_empty());
    assert_eq!(&*other.shared_text(), "DELETE FROM heroes");
}

#[test]
fn test_async_execution_matches_blocking() {
    let rt = runtime();
    let cx = Cx::for_testing();
    let (state, conn) = connection(MockConfig {
        rows_affected: 5,
        scalar: Some(Value::Json(serde_json::json!({"power": 9}))),
        ..MockConfig::default()
    });
    let command: RelationalCommand<common::MockDb> =
        RelationalCommand::new("UPDATE heroes SET age = age + 1", Vec::new());

    rt.block_on(async {
        let req = request(&conn);
        let rows = unwrap_outcome(command.execute_non_query_async(&cx, &req).await)
            .expect("async non query");
        assert_eq!(rows, 5);
        let scalar = unwrap_outcome(command.execute_scalar_async(&cx, &req).await)
            .expect("async scalar");
        assert_eq!(scalar, Some(Value::Json(serde_json::json!({"power": 9}))));
    });

    assert_eq!(state.disposals(), 2);
    assert_eq!(state.closes(), 2);
    assert!(!conn.is_open());
}

#[test]
fn test_async_failure_surfaces_as_err() {
    let rt = runtime();
    let cx = Cx::for_testing();
    let (state, conn) = connection(MockConfig {
        fail_execute: true,
        ..MockConfig::default()
    });
    let command: RelationalCommand<common::MockDb> = RelationalCommand::new("SELEC 1", Vec::new());

    rt.block_on(async {
        match command.execute_scalar_async(&cx, &request(&conn)).await {
            Outcome::Err(Error::Command(_)) => {}
            other => panic!("expected command error, got {:?}", unwrap_outcome(other)),
        }
    });
    assert_eq!(state.disposals(), 1);
    assert_eq!(state.closes(), 1);
}
