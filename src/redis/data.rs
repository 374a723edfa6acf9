/// A reply from `BLPOP`.
///
/// `BLPOP` answers with a two element array, `[key, value]`, naming
/// the route the value was taken from.  A timeout is a nil reply, which
/// is handled by parsing into `Option<PopReply>`.
#[derive(Debug)]
pub(crate) struct PopReply {
    pub route: String,
    pub value: Vec<u8>,
}

impl redis::FromRedisValue for PopReply {
    fn from_redis_value(v: &redis::Value) -> redis::RedisResult<Self> {
        let redis::Value::Bulk(items) = v else {
            return Err(redis::RedisError::from((
                redis::ErrorKind::TypeError,
                "unexpected reply from server while popping",
                format!("expected a [route, item] pair, got {v:?}"),
            )));
        };

        let [route, value] = items.as_slice() else {
            return Err(redis::RedisError::from((
                redis::ErrorKind::TypeError,
                "unexpected reply from server while popping",
                format!("expected 2 elements, got {}", items.len()),
            )));
        };

        Ok(PopReply {
            route: redis::FromRedisValue::from_redis_value(route)?,
            value: redis::FromRedisValue::from_redis_value(value)?,
        })
    }
}
