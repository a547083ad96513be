// Copyright (C) 2026 Marcus L. Hanestad <marlhan@proton.me>
//
// This file is part of MacMirror.
//
// MacMirror is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// MacMirror is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with MacMirror.  If not, see <https://www.gnu.org/licenses/>.

use std::net::IpAddr;

pub fn get_all_ip_addresses() -> Vec<IpAddr> {
    let mut addrs = Vec::new();
    for iface in pnet_datalink::interfaces() {
        for ip in iface.ips {
            match ip {
                ipnetwork::IpNetwork::V4(v4) => addrs.push(IpAddr::V4(v4.ip())),
                ipnetwork::IpNetwork::V6(v6) => addrs.push(IpAddr::V6(v6.ip())),
            }
        }
    }
    addrs
}

/// Non-loopback IPv4 addresses, the ones worth advertising.
pub fn advertised_ip_addresses() -> Vec<IpAddr> {
    get_all_ip_addresses()
        .into_iter()
        .filter(|ip| match ip {
            IpAddr::V4(v4) => !v4.is_loopback(),
            IpAddr::V6(_) => false,
        })
        .collect()
}
