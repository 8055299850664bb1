use crate::browser::BrowserSession;
use crate::config::Config;
use crate::formats::CatalogEntry;

/// List the titles on the account page, in page order.
///
/// Containers without a readable title are skipped. Any other failure yields
/// an empty catalog.
pub async fn discover<S>(session: &mut S, config: &Config) -> Vec<CatalogEntry>
where
    S: BrowserSession + ?Sized,
{
    tokio::time::sleep(config.timeouts.navigation()).await;

    let containers = match session
        .find_elements(&config.selectors.book_containers, None)
        .await
    {
        Ok(containers) => containers,
        Err(err) => {
            tracing::warn!("book discovery failed: {err:#}");
            return Vec::new();
        }
    };

    let mut entries = Vec::with_capacity(containers.len());
    for (index, container) in containers.into_iter().enumerate() {
        let title = match read_title(session, config, &container).await {
            Ok(Some(title)) => title,
            Ok(None) => {
                tracing::warn!(index, "could not extract title for book");
                continue;
            }
            Err(err) => {
                tracing::warn!(index, "could not extract title for book: {err:#}");
                continue;
            }
        };
        entries.push(CatalogEntry {
            index,
            title,
            handle: container,
        });
    }

    tracing::info!(books = entries.len(), "discovered books");
    entries
}

async fn read_title<S>(
    session: &mut S,
    config: &Config,
    container: &crate::browser::ElementRef,
) -> anyhow::Result<Option<String>>
where
    S: BrowserSession + ?Sized,
{
    let Some(heading) = session
        .find_elements(&config.selectors.book_title, Some(container))
        .await?
        .into_iter()
        .next()
    else {
        return Ok(None);
    };
    Ok(Some(session.text(&heading).await?.trim().to_owned()))
}
