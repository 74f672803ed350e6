//! Link resolution over resources and `Link` response headers.

use crate::error::LinkError;
use crate::model::{Link, Linked};
use crate::Result;

/// Finds the link on `resource` with relation `rel` and media type `media_type`.
///
/// A `None` media type only matches links that carry no type. When no link matches,
/// returns `Ok(None)` unless `fail_if_absent` is set, in which case it returns
/// [`LinkError::Missing`]. More than one match is always [`LinkError::Multiple`].
///
/// # Examples
///
/// ```
/// use vcd_client::link::find_link;
/// use vcd_client::model::{Link, Resource};
///
/// let resource = Resource {
///     href: Some("https://vcd/api/org/1".into()),
///     link: vec![Link::new("remove", "https://vcd/api/org/1", None)],
///     ..Default::default()
/// };
/// let link = find_link(&resource, "remove", None, true).unwrap();
/// assert_eq!(link.unwrap().href, "https://vcd/api/org/1");
/// ```
pub fn find_link<'a, R: Linked + ?Sized>(
    resource: &'a R,
    rel: &str,
    media_type: Option<&str>,
    fail_if_absent: bool,
) -> Result<Option<&'a Link>> {
    let mut matches = resource
        .links()
        .iter()
        .filter(|link| link.rel == rel && link.media_type.as_deref() == media_type);

    let error_fields = || {
        (
            resource.href().unwrap_or_default().to_string(),
            rel.to_string(),
            media_type.map(str::to_string),
        )
    };

    match (matches.next(), matches.next()) {
        (Some(link), None) => Ok(Some(link)),
        (Some(_), Some(_)) => {
            let (href, rel, media_type) = error_fields();
            Err(LinkError::Multiple {
                href,
                rel,
                media_type,
            }
            .into())
        }
        (None, _) if fail_if_absent => {
            let (href, rel, media_type) = error_fields();
            Err(LinkError::Missing {
                href,
                rel,
                media_type,
            }
            .into())
        }
        (None, _) => Ok(None),
    }
}

/// Finds a required link, failing with [`LinkError::Missing`] when absent.
pub fn required_link<'a, R: Linked + ?Sized>(
    resource: &'a R,
    rel: &str,
    media_type: Option<&str>,
) -> Result<&'a Link> {
    find_link(resource, rel, media_type, false)?.ok_or_else(|| {
        LinkError::Missing {
            href: resource.href().unwrap_or_default().to_string(),
            rel: rel.to_string(),
            media_type: media_type.map(str::to_string),
        }
        .into()
    })
}

/// Parses an RFC 8288 `Link` header value as used by the OpenAPI surface.
///
/// Entries look like `<https://vcd/cloudapi/1.0.0/x>;rel="remove";type="application/json"`.
/// Malformed entries are skipped.
pub fn parse_link_header(value: &str) -> Vec<Link> {
    value
        .split('<')
        .skip(1)
        .filter_map(|entry| {
            let (href, params) = entry.split_once('>')?;
            let mut link = Link::new(String::new(), href.trim(), None);
            for param in params.trim().trim_end_matches(',').split(';') {
                let Some((key, raw)) = param.split_once('=') else {
                    continue;
                };
                let raw = raw.trim().trim_matches('"').to_string();
                match key.trim() {
                    "rel" => link.rel = raw,
                    "type" => link.media_type = Some(raw),
                    "title" | "name" => link.name = Some(raw),
                    _ => {}
                }
            }
            (!link.rel.is_empty()).then_some(link)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Resource;
    use crate::Error;

    fn resource(links: Vec<Link>) -> Resource {
        Resource {
            href: Some("https://vcd/api/session".into()),
            link: links,
            ..Default::default()
        }
    }

    #[test]
    fn test_find_link_by_rel_and_type() {
        let r = resource(vec![
            Link::new("down", "https://vcd/api/admin", Some("application/vnd.vmware.admin.vcloud+json")),
            Link::new("down", "https://vcd/api/org", Some("application/vnd.vmware.vcloud.orgList+json")),
        ]);
        let link = find_link(&r, "down", Some("application/vnd.vmware.admin.vcloud+json"), false)
            .unwrap()
            .unwrap();
        assert_eq!(link.href, "https://vcd/api/admin");
    }

    #[test]
    fn test_none_type_only_matches_untyped_links() {
        let r = resource(vec![Link::new("remove", "https://vcd/api/x", Some("application/json"))]);
        assert!(find_link(&r, "remove", None, false).unwrap().is_none());
        let err = find_link(&r, "remove", None, true).unwrap_err();
        assert!(matches!(err, Error::Link(LinkError::Missing { .. })));
    }

    #[test]
    fn test_multiple_matches_fail() {
        let r = resource(vec![
            Link::new("down", "https://vcd/api/a", None),
            Link::new("down", "https://vcd/api/b", None),
        ]);
        let err = find_link(&r, "down", None, false).unwrap_err();
        match err {
            Error::Link(LinkError::Multiple { href, rel, .. }) => {
                assert_eq!(href, "https://vcd/api/session");
                assert_eq!(rel, "down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_link_header() {
        let links = parse_link_header(
            "<https://vcd/cloudapi/1.0.0/edgeGateways?page=2>;rel=\"nextPage\";type=\"application/json\", \
             <https://vcd/cloudapi/1.0.0/edgeGateways/1>;rel=\"remove\", <https://vcd/x>;title=\"none\"",
        );
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].rel, "nextPage");
        assert_eq!(links[0].href, "https://vcd/cloudapi/1.0.0/edgeGateways?page=2");
        assert_eq!(links[0].media_type.as_deref(), Some("application/json"));
        assert_eq!(links[1].rel, "remove");
        assert_eq!(links[1].media_type, None);
    }
}
