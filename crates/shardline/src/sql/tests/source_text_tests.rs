/*
 * Copyright 2026 Shardline Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::sql::{collect_parameter_markers, SourceText, SqlDialect, TextRange};
use sqlparser::ast::{SetExpr, Statement, TableFactor};

fn first_table_ident(statement: &Statement) -> sqlparser::ast::Ident {
    let Statement::Query(query) = statement else {
        panic!("expected query");
    };
    let SetExpr::Select(select) = query.body.as_ref() else {
        panic!("expected select");
    };
    match &select.from[0].relation {
        TableFactor::Table { name, .. } => name.0[name.0.len() - 1]
            .as_ident()
            .expect("ident")
            .clone(),
        _ => panic!("expected table"),
    }
}

#[test]
fn parse_statement_rejects_multiple_statements() {
    let err = SqlDialect::MySql
        .parse_statement("SELECT 1; SELECT 2")
        .expect_err("two statements");
    assert!(err.to_string().contains("single statement"));
    assert!(SqlDialect::MySql.parse_statement("SELEC 1").is_err());
}

#[test]
fn ident_ranges_address_source_text() {
    let sql = "SELECT *\n  FROM `t_order` o WHERE o.order_id = 1";
    let statement = SqlDialect::MySql.parse_statement(sql).expect("parse");
    let source = SourceText::new(sql);
    let ident = first_table_ident(&statement);
    let range = source.ident_range(&ident).expect("range");
    assert_eq!(source.slice(range), "`t_order`");
}

#[test]
fn ident_ranges_handle_multibyte_text() {
    let sql = "SELECT 'héllo' AS greeting FROM t_order";
    let statement = SqlDialect::MySql.parse_statement(sql).expect("parse");
    let source = SourceText::new(sql);
    let ident = first_table_ident(&statement);
    let range = source.ident_range(&ident).expect("range");
    assert_eq!(source.slice(range), "t_order");
}

#[test]
fn question_mark_markers_are_numbered_in_text_order() {
    let sql = "SELECT * FROM t_order WHERE user_id = ? AND order_id IN (?, ?)";
    let statement = SqlDialect::MySql.parse_statement(sql).expect("parse");
    let source = SourceText::new(sql);
    let markers = collect_parameter_markers(&statement, &source).expect("markers");
    assert_eq!(
        markers.iter().map(|m| m.index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    for marker in &markers {
        assert_eq!(source.slice(marker.range), "?");
    }
}

#[test]
fn dollar_markers_use_their_number() {
    let sql = "SELECT * FROM t_order WHERE order_id = $2 AND user_id = $1";
    let statement = SqlDialect::PostgreSql.parse_statement(sql).expect("parse");
    let source = SourceText::new(sql);
    let markers = collect_parameter_markers(&statement, &source).expect("markers");
    assert_eq!(
        markers.iter().map(|m| m.index).collect::<Vec<_>>(),
        vec![1, 0]
    );
    assert_eq!(source.slice(markers[0].range), "$2");
}

#[test]
fn text_range_overlap_rules() {
    let a = TextRange::new(5, 10);
    assert!(a.overlaps(&TextRange::new(9, 12)));
    assert!(!a.overlaps(&TextRange::new(10, 12)));
    assert!(!a.overlaps(&TextRange::at(10)));
    assert!(!a.overlaps(&TextRange::at(5)));
    assert!(a.overlaps(&TextRange::at(7)));
    assert!(!TextRange::at(3).overlaps(&TextRange::at(3)));
}

#[test]
fn char_scans_skip_whitespace_only() {
    let source = SourceText::new("INSERT INTO t (a, b ) VALUES (1)");
    assert_eq!(source.next_char_after(19, ')'), Some(20));
    assert_eq!(source.prev_char_before(15, '('), Some(14));
    assert_eq!(source.next_char_after(13, ')'), None);
}
