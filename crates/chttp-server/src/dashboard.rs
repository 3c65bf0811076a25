//! The `/stats` dashboard page.
//!
//! Self-refreshing HTML over a single statistics snapshot; all data
//! comes from `StatsView`, nothing is read outside its critical
//! section.

use chttp_core::constants::DASHBOARD_REFRESH_SECS;
use chttp_ipc::StatsView;
use std::fmt::Write as _;

/// Render the snapshot as the dashboard page.
pub fn render_stats_page(view: &StatsView) -> String {
    let mut page = String::with_capacity(1536);
    let _ = write!(
        page,
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <title>chttpd statistics</title>\n\
         <meta http-equiv='refresh' content='{}'>\n\
         </head>\n\
         <body>\n\
         <h1>Server Statistics</h1>\n",
        DASHBOARD_REFRESH_SECS
    );
    let _ = write!(
        page,
        "<ul>\n\
         <li>Uptime: {} s</li>\n\
         <li>Active connections: {}</li>\n\
         <li>Mean response time: {} ms</li>\n\
         <li>Total requests: {}</li>\n\
         <li>Bytes transferred: {:.2} MiB</li>\n\
         </ul>\n",
        view.uptime_secs,
        view.active_connections,
        view.avg_response_ms(),
        view.total_requests,
        view.mib_transferred()
    );
    let _ = write!(
        page,
        "<h2>Responses by status</h2>\n\
         <table border='1'>\n\
         <tr><th>200</th><th>201</th><th>206</th><th>403</th><th>404</th><th>500</th><th>503</th></tr>\n\
         <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n\
         </table>\n\
         </body>\n\
         </html>\n",
        view.status_200,
        view.status_201,
        view.status_206,
        view.status_403,
        view.status_404,
        view.status_500,
        view.status_503
    );
    page
}
