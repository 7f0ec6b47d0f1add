use crate::access::{AccessGate, Area, Decision, RedirectTarget};
use crate::error::AccessError;

/// Screens of the attendance app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Callback,
    Welcome,
    CheckIn,
    RegisterBiometric,
    Dashboard,
    AttendanceDetail,
    Analysis,
}

impl Route {
    pub const ALL: [Route; 8] = [
        Route::Login,
        Route::Callback,
        Route::Welcome,
        Route::CheckIn,
        Route::RegisterBiometric,
        Route::Dashboard,
        Route::AttendanceDetail,
        Route::Analysis,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Callback => "/callback",
            Route::Welcome => "/welcome",
            Route::CheckIn => "/checkin",
            Route::RegisterBiometric => "/register-touchid",
            Route::Dashboard => "/dashboard",
            Route::AttendanceDetail => "/attendance-detail",
            Route::Analysis => "/analysis",
        }
    }

    /// Query string, fragment and trailing slashes are ignored. `/` and
    /// unknown paths have no route.
    pub fn from_path(path: &str) -> Option<Route> {
        let path = path
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');
        Route::ALL.into_iter().find(|r| r.path() == path)
    }

    /// `None` for screens that are never guarded (the sign-in flow itself).
    /// The welcome and check-in screens both hand back the protected area.
    pub fn area(self) -> Option<Area> {
        match self {
            Route::Login | Route::Callback => None,
            Route::Welcome | Route::CheckIn => Some(Area::Landing),
            Route::RegisterBiometric => Some(Area::OwnerGated),
            Route::Dashboard | Route::AttendanceDetail | Route::Analysis => Some(Area::Protected),
        }
    }
}

impl From<RedirectTarget> for Route {
    fn from(target: RedirectTarget) -> Self {
        match target {
            RedirectTarget::Login => Route::Login,
            RedirectTarget::RegisterBiometric => Route::RegisterBiometric,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    Redirect {
        to: Route,
        error: Option<AccessError>,
    },
}

/// Resolve a navigation request to "render this" or "go there instead".
pub async fn guard(gate: &AccessGate, path: &str) -> Navigation {
    let Some(route) = Route::from_path(path) else {
        return Navigation::Redirect {
            to: Route::Login,
            error: None,
        };
    };

    let Some(area) = route.area() else {
        return Navigation::Render(route);
    };

    match gate.decide(area).await {
        Decision::Allow => Navigation::Render(route),
        Decision::Redirect { to, error } => {
            log::debug!("Guard for {} redirected to {:?}", route.path(), to);
            Navigation::Redirect {
                to: to.into(),
                error,
            }
        }
    }
}
