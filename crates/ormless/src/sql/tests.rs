use super::*;
use crate::error::OrmError;
use crate::param::Param;
use crate::record;

fn params_debug(compiled: &Compiled) -> Vec<String> {
    compiled.params.iter().map(|p| format!("{p:?}")).collect()
}

#[test]
fn identifiers_are_double_quoted() {
    let q = sql("SELECT * FROM ").push_ident("books");
    assert_eq!(q.compile().unwrap().text, r#"SELECT * FROM "books""#);
}

#[test]
fn raw_and_default_pass_through() {
    let q = sql("INSERT INTO t VALUES (")
        .push_default()
        .push(", ")
        .push_raw("now()")
        .push(")");
    let compiled = q.compile().unwrap();
    assert_eq!(compiled.text, "INSERT INTO t VALUES (DEFAULT, now())");
    assert!(compiled.params.is_empty());
}

#[test]
fn placeholders_follow_document_order_across_nesting() {
    let inner = sql("b = ").push_bind(2_i32).push(" AND c = ").push_bind(3_i32);
    let deeper = sql("e = ").push_bind(5_i32);
    let q = sql("SELECT 1 WHERE a = ")
        .push_bind(1_i32)
        .push(" AND (")
        .push_fragment(inner)
        .push(") AND d = ")
        .push_bind(4_i32)
        .push(" AND (")
        .push_fragment(sql("").push_fragment(deeper))
        .push(")");

    let compiled = q.compile().unwrap();
    assert_eq!(
        compiled.text,
        "SELECT 1 WHERE a = $1 AND (b = $2 AND c = $3) AND d = $4 AND (e = $5)"
    );
    assert_eq!(
        params_debug(&compiled),
        vec!["Param(1)", "Param(2)", "Param(3)", "Param(4)", "Param(5)"]
    );
}

#[test]
fn predicate_text_ignores_insertion_order() {
    let a = record! { "title" => "Emma", "authorId" => 1_i32, "year" => 1815_i32 };
    let b = record! { "year" => 1815_i32, "title" => "Emma", "authorId" => 1_i32 };

    let qa = sql("SELECT * FROM t WHERE ").push_where(a).compile().unwrap();
    let qb = sql("SELECT * FROM t WHERE ").push_where(b).compile().unwrap();

    assert_eq!(qa.text, qb.text);
    assert_eq!(
        qa.text,
        r#"SELECT * FROM t WHERE ("authorId" = $1 AND "title" = $2 AND "year" = $3)"#
    );
    assert_eq!(params_debug(&qa), params_debug(&qb));
}

#[test]
fn empty_predicate_is_true() {
    let q = sql("DELETE FROM t WHERE ").push_where(Where::new());
    assert_eq!(q.compile().unwrap().text, "DELETE FROM t WHERE TRUE");
}

#[test]
fn predicate_fragment_sees_its_column_as_self() {
    let w = Where::new().set("authorId", 1_i32).set(
        "createdAt",
        sql("").push_self().push(" > now() - ").push_bind(7_i32).push(" * INTERVAL '1 DAY'"),
    );
    let compiled = sql("SELECT * FROM ")
        .push_ident("books")
        .push(" WHERE ")
        .push_where(w)
        .compile()
        .unwrap();

    assert_eq!(
        compiled.text,
        r#"SELECT * FROM "books" WHERE ("authorId" = $1 AND ("createdAt" > now() - $2 * INTERVAL '1 DAY'))"#
    );
    assert_eq!(params_debug(&compiled), vec!["Param(1)", "Param(7)"]);
}

#[test]
fn default_is_not_a_predicate_value() {
    let w = Where::new().set_default("id");
    let err = sql("SELECT 1 WHERE ").push_where(w).compile().unwrap_err();
    assert!(matches!(err, OrmError::Compile(_)));
}

#[test]
fn self_reference_without_column_fails() {
    let err = sql("SELECT ").push_self().compile().unwrap_err();
    assert!(matches!(err, OrmError::Context(_)));
}

#[test]
fn parent_reference_without_alias_fails() {
    let err = sql("SELECT ").push_parent("id").compile().unwrap_err();
    assert!(matches!(err, OrmError::Context(_)));

    let w = Where::new().set("authorId", parent("id"));
    let err = sql("SELECT 1 WHERE ").push_where(w).compile().unwrap_err();
    assert!(matches!(err, OrmError::Context(_)));
}

#[test]
fn parent_reference_uses_fragment_alias() {
    let q = sql("SELECT * FROM ")
        .push_ident("books")
        .push(" WHERE ")
        .push_where(Where::new().set("authorId", parent("id")))
        .with_parent_alias("authors");
    assert_eq!(
        q.compile().unwrap().text,
        r#"SELECT * FROM "books" WHERE ("authorId" = "authors"."id")"#
    );
}

#[test]
fn nested_alias_overrides_inherited_one() {
    let inner = sql("").push_parent("id").with_parent_alias("inner");
    let q = sql("")
        .push_parent("id")
        .push(" ")
        .push_fragment(inner)
        .push(" ")
        .push_fragment(sql("").push_parent("id"))
        .with_parent_alias("outer");
    assert_eq!(
        q.compile().unwrap().text,
        r#""outer"."id" "inner"."id" "outer"."id""#
    );
}

#[test]
fn column_and_value_lists_stay_aligned() {
    let row = record! {
        "name" => "Jane Austen",
        "id" => 1_i32,
        "isLiving" => false,
        "createdAt" => sql("now()"),
    };
    let q = sql("INSERT INTO ")
        .push_ident("authors")
        .push(" (")
        .push_cols(&row)
        .push(") VALUES (")
        .push_vals(row)
        .push(")");
    let compiled = q.compile().unwrap();

    assert_eq!(
        compiled.text,
        r#"INSERT INTO "authors" ("createdAt", "id", "isLiving", "name") VALUES (now(), $1, $2, $3)"#
    );
    assert_eq!(
        params_debug(&compiled),
        vec!["Param(1)", "Param(false)", "Param(\"Jane Austen\")"]
    );
}

#[test]
fn value_fragments_see_their_column_as_self() {
    let row = record! { "count" => sql("").push_self().push(" + ").push_bind(1_i32) };
    let q = sql("UPDATE t SET (")
        .push_cols(&row)
        .push(") = ROW(")
        .push_vals(row)
        .push(")");
    assert_eq!(
        q.compile().unwrap().text,
        r#"UPDATE t SET ("count") = ROW("count" + $1)"#
    );
}

#[test]
fn explicit_column_lists_keep_caller_order() {
    let q = sql("SELECT ").push_node(Node::cols(["title", "authorId"]));
    assert_eq!(q.compile().unwrap().text, r#"SELECT "title", "authorId""#);
}

#[test]
fn sequences_compile_without_separators() {
    let seq = Node::Seq(vec![
        Node::Ident("a".into()),
        Node::Raw(".".into()),
        Node::Ident("b".into()),
    ]);
    assert_eq!(sql("").push_node(seq).compile().unwrap().text, r#""a"."b""#);

    let joined = Node::join(
        [Node::Param(Param::new(1_i32)), Node::Param(Param::new(2_i32))],
        ", ",
    );
    assert_eq!(sql("IN (").push_node(joined).push(")").compile().unwrap().text, "IN ($1, $2)");
}

#[test]
fn from_parts_enforces_literal_count() {
    let ok = Fragment::from_parts(
        vec!["SELECT * FROM ".into(), " WHERE id = ".into(), String::new()],
        vec![Node::Ident("books".into()), Node::Param(Param::new(1_i32))],
    )
    .unwrap();
    assert_eq!(ok.compile().unwrap().text, r#"SELECT * FROM "books" WHERE id = $1"#);

    let err = Fragment::from_parts(vec!["a".into()], vec![Node::Default]).unwrap_err();
    assert!(matches!(err, OrmError::Compile(_)));
}

#[test]
fn compile_node_appends_to_an_accumulating_result() {
    let mut out = Compiled::default();
    out.text.push_str("x = ");
    out.params.push(Param::new(0_i32));
    compile_node(&Node::SelfRef, &mut out, Context::new().with_column("y")).unwrap();
    out.text.push_str(" + ");
    compile_node(&Node::Param(Param::new(9_i32)), &mut out, Context::new()).unwrap();
    assert_eq!(out.text, r#"x = "y" + $2"#);
}

#[test]
fn result_transforms_shape_results() {
    use serde_json::json;

    let rows = vec![json!({"id": 1}), json!({"id": 2})];
    assert_eq!(ResultTransform::All.apply(rows.clone()), json!([{"id": 1}, {"id": 2}]));
    assert_eq!(ResultTransform::First.apply(rows), json!({"id": 1}));
    assert_eq!(ResultTransform::First.apply(vec![]), json!(null));
    assert_eq!(ResultTransform::Count.apply(vec![json!(3)]), json!(3));
    assert_eq!(ResultTransform::Count.apply(vec![]), json!(0));
}
