use crate::item::BuildRef;
use crate::queue::QueueError;
use crate::redis::consumer::open_item;
use crate::redis::RedisClient;
use tokio_util::sync::CancellationToken;

impl RedisClient {
    /// Sums `LLEN` over every configured route.
    ///
    /// The lengths are read in one pipeline; if any of them fails the
    /// whole call fails, and no partial total is returned.
    #[tracing::instrument(skip_all)]
    pub(crate) async fn total_length(&self, cancel: &CancellationToken) -> Result<u64, QueueError> {
        let mut pipeline = redis::pipe();
        for route in self.router.routes() {
            pipeline.llen(route);
        }

        let lengths: Vec<u64> = self
            .execute(cancel, "read queue length", move |mut connection| async move {
                pipeline.query_async(&mut connection).await
            })
            .await?;

        Ok(lengths.into_iter().sum())
    }

    /// `LLEN` of a single configured route.
    #[tracing::instrument(skip(self, cancel))]
    pub(crate) async fn length_of(
        &self,
        cancel: &CancellationToken,
        route: &str,
    ) -> Result<u64, QueueError> {
        let route = self.configured_route(route)?;

        let mut command = redis::cmd("LLEN");
        command.arg(route);

        self.query(cancel, "read route length", command).await
    }

    /// Finds the build on its route.
    ///
    /// This reads the whole route (`LRANGE {route} 0 -1`) and returns
    /// the index of the first item for the build, counting from the
    /// next item to be popped.  Entries that fail to open are skipped.
    /// Anything going wrong, including the build not being there,
    /// reports 0.
    #[tracing::instrument(
        skip(self, cancel, build),
        fields(build = build.id, route = build.route())
    )]
    pub(crate) async fn rank_of(&self, cancel: &CancellationToken, build: &BuildRef) -> u64 {
        let route = match self.configured_route(build.route()) {
            Ok(route) => route,
            Err(error) => {
                tracing::debug!(%error, "failed to look up build position");
                return 0;
            }
        };

        let mut command = redis::cmd("LRANGE");
        command.arg(route).arg(0).arg(-1);

        let entries: Vec<Vec<u8>> = match self.query(cancel, "read route items", command).await {
            Ok(entries) => entries,
            Err(error) => {
                tracing::debug!(%error, "failed to look up build position");
                return 0;
            }
        };

        let rank = entries.iter().position(|stored| {
            open_item(&self.config.keys, stored).is_ok_and(|item| item.build.id == build.id)
        });

        match rank.and_then(|rank| u64::try_from(rank).ok()) {
            Some(rank) => rank,
            None => {
                tracing::debug!("build not found on its route");
                0
            }
        }
    }
}
