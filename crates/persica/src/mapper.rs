use crate::session::SqlSession;

/// Stands in for "the mapper-interface dynamic-proxy binding" (spec §6),
/// which Rust has no runtime-proxy equivalent for. Pairs a namespace with a
/// borrowed `SqlSession` so a hand-written mapper method — no macro or
/// reflection layer is claimed — can route to the right statement id
/// without spelling out the `"{namespace}.{method}"` concatenation itself:
///
/// ```ignore
/// struct UserMapper<'a>(MapperBinding<'a>);
///
/// impl<'a> UserMapper<'a> {
///     fn find_by_id(&mut self, id: i64) -> persica_core::Result<Option<persica_core::Value>> {
///         let statement_id = self.0.statement_id("findById");
///         self.0.session().select_one(&statement_id, persica_core::Value::I64(id))
///     }
/// }
/// ```
pub struct MapperBinding<'a> {
    namespace: &'static str,
    session: &'a mut SqlSession,
}

impl<'a> MapperBinding<'a> {
    pub fn new(namespace: &'static str, session: &'a mut SqlSession) -> Self {
        Self { namespace, session }
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// The fully-qualified statement id a mapper method named `method` maps
    /// to, matching MyBatis's own `namespace.methodName` convention.
    pub fn statement_id(&self, method: &str) -> String {
        format!("{}.{}", self.namespace, method)
    }

    pub fn session(&mut self) -> &mut SqlSession {
        self.session
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use persica_ast::SqlNode;
    use persica_core::{BeanAccessor, ParamSink, Result, TypeHandlerRegistryBuilder, Value, ValueBean};
    use persica_engine::{
        CallableStatementHandle, CompiledStatement, Connection, PreparedStatementHandle, RowCursor, Session, SimpleStatementHandle, StatementExecutor,
        StatementKind, StatementRegistryBuilder,
    };
    use persica_mapper::{Row, ResultMap, ResultMapRegistryBuilder};

    use super::*;

    struct OneRowConnection;

    impl Connection for OneRowConnection {
        fn prepare(&mut self, _sql: &str) -> Result<Box<dyn PreparedStatementHandle>> {
            Ok(Box::new(OneRowStatement))
        }
        fn prepare_callable(&mut self, _sql: &str) -> Result<Box<dyn CallableStatementHandle>> {
            unimplemented!("not exercised by this test")
        }
        fn create_simple_statement(&mut self) -> Result<Box<dyn SimpleStatementHandle>> {
            unimplemented!("not exercised by this test")
        }
        fn commit(&mut self) -> Result<()> {
            Ok(())
        }
        fn rollback(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct OneRowStatement;

    impl ParamSink for OneRowStatement {
        fn bind(&mut self, _ordinal: usize, _value: Value, _column_type: &str) -> Result<()> {
            Ok(())
        }
    }

    impl PreparedStatementHandle for OneRowStatement {
        fn set_fetch_size(&mut self, _size: usize) -> Result<()> {
            Ok(())
        }
        fn set_timeout_seconds(&mut self, _seconds: u64) -> Result<()> {
            Ok(())
        }
        fn execute_update(&mut self) -> Result<u64> {
            Ok(0)
        }
        fn execute_query(&mut self) -> Result<Box<dyn RowCursor>> {
            Ok(Box::new(OneRowCursor { served: false }))
        }
        fn generated_keys(&mut self) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }
        fn add_batch(&mut self) -> Result<()> {
            Ok(())
        }
        fn execute_batch(&mut self) -> Result<Vec<u64>> {
            Ok(Vec::new())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct OneRowCursor {
        served: bool,
    }

    impl RowCursor for OneRowCursor {
        fn next(&mut self) -> Result<Option<Row>> {
            if self.served {
                return Ok(None);
            }
            self.served = true;
            Ok(Some(Row::new().with("id", 9i64)))
        }
    }

    #[test]
    fn statement_id_joins_namespace_and_method() {
        let ast = Arc::new(SqlNode::StaticText("SELECT 1".to_string()));
        let mut stmt = CompiledStatement::new("User.findById", StatementKind::Select, ast);
        stmt.result_map_ids.push("User".to_string());
        let result_map = ResultMap::new("User", "User");
        let result_maps = ResultMapRegistryBuilder::new().register(result_map).freeze().unwrap();
        let type_handlers = TypeHandlerRegistryBuilder::new().freeze();
        let registry = StatementRegistryBuilder::new()
            .register(stmt)
            .result_maps(result_maps)
            .type_handlers(type_handlers)
            .freeze()
            .unwrap();

        let bean: Arc<dyn BeanAccessor> = Arc::new(ValueBean);
        let connection: Box<dyn Connection> = Box::new(OneRowConnection);
        let executor = Box::new(StatementExecutor::new(
            connection,
            registry.clone(),
            bean.clone(),
            Default::default(),
            Default::default(),
        ));
        let mut session = SqlSession::new(Session::new(executor, registry, bean));
        let mut binding = MapperBinding::new("User", &mut session);

        let stmt_id = binding.statement_id("findById");
        assert_eq!(stmt_id, "User.findById");
        let rows = binding.session().select_list(&stmt_id, Value::Null, Default::default()).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
