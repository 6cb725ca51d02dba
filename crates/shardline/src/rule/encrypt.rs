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

use crate::config::EncryptRuleConfig;
use crate::error::{Result, ShardError};
use crate::rule::algorithm::AlgorithmRegistry;
use crate::types::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub struct EncryptContext<'a> {
    pub table: &'a str,
    pub column: &'a str,
}

/// Reversible cipher for a logical column. Implementations live outside this crate.
pub trait EncryptAlgorithm: Send + Sync + fmt::Debug {
    fn encrypt(&self, plain: &Value, ctx: &EncryptContext<'_>) -> Result<Value>;
    fn decrypt(&self, cipher: &Value, ctx: &EncryptContext<'_>) -> Result<Value>;
}

/// Deterministic one-way transform stored in the assisted query column.
pub trait AssistedEncryptAlgorithm: Send + Sync + fmt::Debug {
    fn encrypt(&self, plain: &Value, ctx: &EncryptContext<'_>) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct EncryptColumn {
    pub logic: String,
    pub cipher: String,
    pub assisted_query: Option<String>,
    pub plain: Option<String>,
    encryptor: Arc<dyn EncryptAlgorithm>,
    assisted_encryptor: Option<Arc<dyn AssistedEncryptAlgorithm>>,
}

impl EncryptColumn {
    pub fn new(
        logic: impl Into<String>,
        cipher: impl Into<String>,
        encryptor: Arc<dyn EncryptAlgorithm>,
    ) -> Self {
        Self {
            logic: logic.into(),
            cipher: cipher.into(),
            assisted_query: None,
            plain: None,
            encryptor,
            assisted_encryptor: None,
        }
    }

    pub fn with_assisted_query(
        mut self,
        column: impl Into<String>,
        encryptor: Arc<dyn AssistedEncryptAlgorithm>,
    ) -> Self {
        self.assisted_query = Some(column.into());
        self.assisted_encryptor = Some(encryptor);
        self
    }

    pub fn with_plain(mut self, column: impl Into<String>) -> Self {
        self.plain = Some(column.into());
        self
    }

    /// Column that equality predicates are evaluated against.
    pub fn query_column(&self) -> &str {
        self.assisted_query.as_deref().unwrap_or(&self.cipher)
    }

    pub fn encrypt(&self, table: &str, plain: &Value) -> Result<Value> {
        if plain.is_null() {
            return Ok(Value::Null);
        }
        self.encryptor.encrypt(
            plain,
            &EncryptContext {
                table,
                column: &self.logic,
            },
        )
    }

    pub fn decrypt(&self, table: &str, cipher: &Value) -> Result<Value> {
        if cipher.is_null() {
            return Ok(Value::Null);
        }
        self.encryptor.decrypt(
            cipher,
            &EncryptContext {
                table,
                column: &self.logic,
            },
        )
    }

    /// Value for the assisted query column, or `None` when none is configured.
    pub fn assisted_encrypt(&self, table: &str, plain: &Value) -> Result<Option<Value>> {
        let Some(encryptor) = &self.assisted_encryptor else {
            return Ok(None);
        };
        if plain.is_null() {
            return Ok(Some(Value::Null));
        }
        encryptor
            .encrypt(
                plain,
                &EncryptContext {
                    table,
                    column: &self.logic,
                },
            )
            .map(Some)
    }

    /// Value compared against [`Self::query_column`] in predicates.
    pub fn query_value(&self, table: &str, plain: &Value) -> Result<Value> {
        match self.assisted_encrypt(table, plain)? {
            Some(v) => Ok(v),
            None => self.encrypt(table, plain),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncryptTable {
    pub name: String,
    pub columns: Vec<EncryptColumn>,
}

impl EncryptTable {
    pub fn find_column(&self, logic: &str) -> Option<&EncryptColumn> {
        self.columns
            .iter()
            .find(|c| c.logic.eq_ignore_ascii_case(logic))
    }

    pub fn is_cipher_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.cipher.eq_ignore_ascii_case(name))
    }

    pub fn is_assisted_query_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| {
            c.assisted_query
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(name))
        })
    }

    pub fn is_plain_column(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|c| c.plain.as_deref().is_some_and(|p| p.eq_ignore_ascii_case(name)))
    }

    pub fn logic_column_of_cipher(&self, cipher: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.cipher.eq_ignore_ascii_case(cipher))
            .map(|c| c.logic.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EncryptRule {
    tables: HashMap<String, EncryptTable>,
}

impl EncryptRule {
    pub fn new(tables: Vec<EncryptTable>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|t| (t.name.to_ascii_lowercase(), t))
                .collect(),
        }
    }

    pub fn build(config: &EncryptRuleConfig, registry: &AlgorithmRegistry) -> Result<Self> {
        let mut tables = Vec::with_capacity(config.tables.len());
        for (table, table_config) in &config.tables {
            let mut columns = Vec::with_capacity(table_config.columns.len());
            for (logic, column_config) in &table_config.columns {
                let encryptor_config =
                    config.encryptors.get(&column_config.encryptor).ok_or_else(|| {
                        ShardError::Config(format!(
                            "encryptor '{}' is not declared",
                            column_config.encryptor
                        ))
                    })?;
                let mut column = EncryptColumn::new(
                    logic.clone(),
                    column_config.cipher.clone(),
                    registry.create_encryptor(encryptor_config)?,
                );
                if let (Some(assisted), Some(name)) = (
                    &column_config.assisted_query,
                    &column_config.assisted_query_encryptor,
                ) {
                    let assisted_config = config.encryptors.get(name).ok_or_else(|| {
                        ShardError::Config(format!("encryptor '{name}' is not declared"))
                    })?;
                    column = column.with_assisted_query(
                        assisted.clone(),
                        registry.create_assisted_encryptor(assisted_config)?,
                    );
                }
                if let Some(plain) = &column_config.plain {
                    column = column.with_plain(plain.clone());
                }
                columns.push(column);
            }
            tables.push(EncryptTable {
                name: table.clone(),
                columns,
            });
        }
        Ok(Self::new(tables))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn find_table(&self, name: &str) -> Option<&EncryptTable> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    pub fn find_column(&self, table: &str, column: &str) -> Option<&EncryptColumn> {
        self.find_table(table)?.find_column(column)
    }
}
